//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is `{"code": "...", "message": "..."}`. Internal failures
//! are logged here and answered with a generic message.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use formation_payments::{CheckoutError, DispatchError};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("formation {0} cannot accept payments yet")]
  PayoutNotConfigured(Uuid),

  #[error("formation {0} not found")]
  FormationNotFound(Uuid),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("invalid signature")]
  InvalidSignature,

  #[error("invalid event: {0}")]
  InvalidEvent(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden")]
  Forbidden,

  #[error("not found: {0}")]
  NotFound(String),

  #[error("payment provider unavailable: {0}")]
  Provider(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn code(&self) -> &'static str {
    match self {
      ApiError::PayoutNotConfigured(_) => "PayoutNotConfigured",
      ApiError::FormationNotFound(_) => "FormationNotFound",
      ApiError::InvalidRequest(_) => "InvalidRequest",
      ApiError::InvalidSignature => "InvalidSignature",
      ApiError::InvalidEvent(_) => "InvalidEvent",
      ApiError::Unauthorized => "Unauthorized",
      ApiError::Forbidden => "Forbidden",
      ApiError::NotFound(_) => "NotFound",
      ApiError::Provider(_) | ApiError::Internal(_) => "Internal",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::PayoutNotConfigured(_) => StatusCode::CONFLICT,
      ApiError::FormationNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::InvalidRequest(_) | ApiError::InvalidSignature | ApiError::InvalidEvent(_) => {
        StatusCode::BAD_REQUEST
      }
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden => StatusCode::FORBIDDEN,
      ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let message = match &self {
      ApiError::Provider(e) => {
        tracing::error!(error = %e, "payment provider call failed");
        "payment provider unavailable".to_owned()
      }
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        "internal error".to_owned()
      }
      other => other.to_string(),
    };

    let mut res =
      (self.status(), Json(json!({ "code": self.code(), "message": message }))).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"formation\""),
      );
    }
    res
  }
}

// ─── Conversions ─────────────────────────────────────────────────────────────

impl From<CheckoutError> for ApiError {
  fn from(e: CheckoutError) -> Self {
    match e {
      CheckoutError::FormationNotFound(id) => ApiError::FormationNotFound(id),
      CheckoutError::PayoutNotConfigured(id) => ApiError::PayoutNotConfigured(id),
      CheckoutError::InvalidEmail(email) => {
        ApiError::InvalidRequest(format!("invalid buyer email: {email:?}"))
      }
      CheckoutError::Provider(e) => ApiError::Provider(Box::new(e)),
      CheckoutError::Store(e) => ApiError::Internal(e),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::InvalidRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { ApiError::InvalidRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { ApiError::InvalidRequest(rejection.body_text()) }
}

impl From<DispatchError> for ApiError {
  fn from(e: DispatchError) -> Self {
    match e {
      // The reason stays in the server log.
      DispatchError::InvalidSignature(_) => ApiError::InvalidSignature,
      DispatchError::InvalidEvent(msg) => ApiError::InvalidEvent(msg),
      DispatchError::Transient(e) => ApiError::Internal(e),
    }
  }
}

impl From<formation_core::Error> for ApiError {
  fn from(e: formation_core::Error) -> Self {
    use formation_core::Error;
    match e {
      Error::AccessDenied => ApiError::Forbidden,
      Error::Store(e) => ApiError::Internal(e),
      other => ApiError::InvalidRequest(other.to_string()),
    }
  }
}

//! HTTP Basic buyer authentication.
//!
//! Buyers log in with the email they paid with and the credential from their
//! welcome notification.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use formation_core::{ledger::normalize_email, store::LedgerStore};
use formation_payments::{PaymentProvider, credential::verify_credential};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Present in a handler means the request carried a valid buyer credential.
#[derive(Debug, Clone)]
pub struct AuthenticatedBuyer {
  pub student_id: Uuid,
  pub email:      String,
}

/// Decode `Authorization: Basic ...` into `(email, credential)`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
  let encoded = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Basic "))
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded.trim()).map_err(|_| ApiError::Unauthorized)?;
  let creds = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;
  let (email, credential) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  Ok((email.to_owned(), credential.to_owned()))
}

/// Look up the student for `email` and check `credential` against its hash.
pub async fn authenticate<S>(
  store: &S,
  email: &str,
  credential: &str,
) -> Result<AuthenticatedBuyer, ApiError>
where
  S: LedgerStore,
{
  let email = normalize_email(email).map_err(|_| ApiError::Unauthorized)?;
  let student = store
    .find_student_by_email(email)
    .await
    .map_err(|e| ApiError::Internal(Box::new(e)))?
    .ok_or(ApiError::Unauthorized)?;

  if !verify_credential(credential, &student.credential_hash) {
    return Err(ApiError::Unauthorized);
  }
  Ok(AuthenticatedBuyer { student_id: student.student_id, email: student.email })
}

impl<S, P> FromRequestParts<AppState<S, P>> for AuthenticatedBuyer
where
  S: LedgerStore,
  P: PaymentProvider,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, P>,
  ) -> Result<Self, Self::Rejection> {
    let (email, credential) = basic_credentials(&parts.headers)?;
    authenticate(state.store.as_ref(), &email, &credential).await
  }
}

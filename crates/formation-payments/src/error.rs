//! Error types for `formation-payments`.
//!
//! The split between the enums mirrors how a failure must be answered: a
//! caller mistake, a bad signature, a permanent problem with a signed event,
//! or a transient fault worth a retry.

use thiserror::Error;
use uuid::Uuid;

/// Failure talking to the payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
  #[error("provider request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("provider rejected the request ({status}): {message}")]
  Rejected { status: u16, message: String },

  #[error("unexpected provider response: {0}")]
  InvalidResponse(String),
}

/// Why a checkout could not be started.
#[derive(Debug, Error)]
pub enum CheckoutError {
  /// Absent or unpublished.
  #[error("formation not found: {0}")]
  FormationNotFound(Uuid),

  #[error("creator of formation {0} has not completed payout onboarding")]
  PayoutNotConfigured(Uuid),

  #[error("invalid buyer email: {0:?}")]
  InvalidEmail(String),

  #[error(transparent)]
  Provider(#[from] ProviderError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Why an inbound webhook signature was refused.
///
/// Callers must not reveal which variant occurred.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
  #[error("signature header missing")]
  Missing,

  #[error("signature header malformed")]
  Malformed,

  #[error("signature timestamp outside tolerance")]
  Expired,

  #[error("signature mismatch")]
  Mismatch,
}

/// A correctly signed payload that does not describe a usable event.
#[derive(Debug, Error)]
pub enum EventError {
  #[error("event is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("event lacks {0}")]
  MissingField(&'static str),

  #[error("event metadata {key} is missing or invalid")]
  InvalidMetadata { key: &'static str },
}

#[derive(Debug, Error)]
pub enum FulfillmentError {
  #[error("event names unknown formation {0}")]
  UnknownFormation(Uuid),

  #[error("event creator {claimed} does not own formation {formation_id}")]
  CreatorMismatch { formation_id: Uuid, claimed: Uuid },

  #[error("event carries an invalid buyer email: {0:?}")]
  InvalidEmail(String),

  #[error("event carries an invalid amount: {0}")]
  InvalidAmount(i64),

  #[error("could not issue a credential: {0}")]
  Credential(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FulfillmentError {
  /// Whether a redelivery of the same event could succeed.
  pub fn is_transient(&self) -> bool { matches!(self, Self::Store(_) | Self::Credential(_)) }
}

#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("notification transport failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("notification endpoint answered {0}")]
  Status(u16),
}

/// The answer to one webhook delivery, from the provider's point of view.
#[derive(Debug, Error)]
pub enum DispatchError {
  /// Reject, do not retry, disclose nothing.
  #[error("invalid signature")]
  InvalidSignature(#[source] SignatureError),

  /// Signed but unusable; a retry cannot help.
  #[error("invalid event: {0}")]
  InvalidEvent(String),

  /// Nothing was committed; the provider should redeliver.
  #[error("transient failure: {0}")]
  Transient(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DispatchError {
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Transient(_)) }
}

impl From<EventError> for DispatchError {
  fn from(e: EventError) -> Self { Self::InvalidEvent(e.to_string()) }
}

impl From<FulfillmentError> for DispatchError {
  fn from(e: FulfillmentError) -> Self {
    if e.is_transient() {
      Self::Transient(Box::new(e))
    } else {
      Self::InvalidEvent(e.to_string())
    }
  }
}

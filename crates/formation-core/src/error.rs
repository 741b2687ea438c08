//! Error types for `formation-core`.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("amount must not be negative: {0}")]
  NegativeAmount(Decimal),

  #[error("amount is not a finite number")]
  NonFinite,

  #[error("amount has more than two fractional digits: {0}")]
  TooPrecise(Decimal),

  #[error("amount is out of range")]
  AmountOutOfRange,

  #[error("fee rate must be within [0, 1]: {0}")]
  InvalidFeeRate(Decimal),

  #[error("invalid email address: {0:?}")]
  InvalidEmail(String),

  #[error("unknown lesson kind: {0:?}")]
  UnknownLessonKind(String),

  /// The access gate refused the buyer. Deliberately carries no detail.
  #[error("access denied")]
  AccessDenied,

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error type for `formation-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] formation_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("creator not found: {0}")]
  CreatorNotFound(uuid::Uuid),

  #[error("formation not found: {0}")]
  FormationNotFound(uuid::Uuid),

  #[error("module not found: {0}")]
  ModuleNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

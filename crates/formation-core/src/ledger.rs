//! Buyers and purchases: the durable effect of a verified payment.
//!
//! Neither is ever created directly from untrusted input; both are written
//! by the fulfillment path only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Student ─────────────────────────────────────────────────────────────────

/// A buyer, identified by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub student_id:      Uuid,
  /// Normalised (trimmed, lower-case); unique across students.
  pub email:           String,
  pub display_name:    String,
  /// Argon2 PHC string.
  #[serde(skip_serializing)]
  pub credential_hash: String,
  /// Set once a credential matching `credential_hash` has been sent.
  pub credential_sent: bool,
  pub created_at:      DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStudent {
  pub email:           String,
  pub display_name:    String,
  pub credential_hash: String,
}

/// Canonical form of an email address for identity comparison.
pub fn normalize_email(raw: &str) -> Result<String> {
  let email = raw.trim().to_lowercase();
  let valid = match email.split_once('@') {
    Some((local, domain)) => {
      !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
    }
    None => false,
  };
  if valid { Ok(email) } else { Err(Error::InvalidEmail(raw.to_owned())) }
}

/// A display name derived from the local part of an email address.
pub fn display_name_from_email(email: &str) -> String {
  email.split('@').next().unwrap_or(email).to_owned()
}

// ─── Purchase ────────────────────────────────────────────────────────────────

/// An immutable ledger entry for one completed, paid transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
  pub purchase_id:        Uuid,
  pub student_id:         Uuid,
  pub formation_id:       Uuid,
  /// What the buyer actually paid, independent of later price edits.
  pub amount:             Decimal,
  /// The provider's transaction id; unique, and the idempotency key.
  pub external_reference: String,
  pub created_at:         DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
  pub student_id:         Uuid,
  pub formation_id:       Uuid,
  pub amount:             Decimal,
  pub external_reference: String,
}

// ─── Insert-or-fetch result ──────────────────────────────────────────────────

/// The result of an atomic insert-or-return-existing.
#[derive(Debug, Clone)]
pub struct Upserted<T> {
  pub record:  T,
  /// `true` only if this call inserted the row.
  pub created: bool,
}

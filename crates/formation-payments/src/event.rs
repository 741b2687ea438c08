//! Typed provider events.
//!
//! Parsing starts from a [`VerifiedPayload`]; there is no way to build a
//! [`ProviderEvent`] from raw bytes.

use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::{checkout::CheckoutMetadata, error::EventError, webhook::VerifiedPayload};

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_ASYNC_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const ACCOUNT_UPDATED: &str = "account.updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
  Paid,
  Unpaid,
  NoPaymentRequired,
  #[serde(other)]
  Unknown,
}

impl PaymentStatus {
  /// Whether funds are captured and the sale can be fulfilled.
  pub fn is_settled(self) -> bool { matches!(self, Self::Paid | Self::NoPaymentRequired) }
}

/// A hosted checkout finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
  /// Used as the purchase's external reference.
  pub session_id:         String,
  pub buyer_email:        String,
  pub amount_total_minor: Option<i64>,
  pub payment_status:     Option<PaymentStatus>,
  pub metadata:           CheckoutMetadata,
}

impl CheckoutCompleted {
  /// Sessions without a status are treated as paid.
  pub fn is_settled(&self) -> bool { self.payment_status.is_none_or(PaymentStatus::is_settled) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutAccountUpdated {
  pub account:           String,
  pub details_submitted: bool,
  pub charges_enabled:   bool,
}

impl PayoutAccountUpdated {
  pub fn is_ready(&self) -> bool { self.details_submitted && self.charges_enabled }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
  /// `kind` is either of the checkout completion types.
  CheckoutCompleted { kind: String, checkout: CheckoutCompleted },
  PayoutAccountUpdated(PayoutAccountUpdated),
  /// Acknowledged and otherwise ignored.
  Unknown { kind: String },
}

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  kind: String,
  #[serde(default)]
  data: Option<EnvelopeData>,
}

#[derive(Deserialize)]
struct EnvelopeData {
  #[serde(default)]
  object: Option<serde_json::Value>,
}

impl Envelope {
  fn into_object(self) -> Result<serde_json::Value, EventError> {
    self.data.and_then(|d| d.object).ok_or(EventError::MissingField("data.object"))
  }
}

#[derive(Deserialize)]
struct RawSession {
  id:               Option<String>,
  customer_email:   Option<String>,
  customer_details: Option<RawCustomerDetails>,
  amount_total:     Option<i64>,
  payment_status:   Option<PaymentStatus>,
  #[serde(default)]
  metadata:         HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawCustomerDetails {
  email: Option<String>,
}

#[derive(Deserialize)]
struct RawAccount {
  id:                Option<String>,
  #[serde(default)]
  details_submitted: bool,
  #[serde(default)]
  charges_enabled:   bool,
}

fn metadata_uuid(
  metadata: &HashMap<String, String>,
  key: &'static str,
) -> Result<Uuid, EventError> {
  metadata
    .get(key)
    .and_then(|v| Uuid::parse_str(v.trim()).ok())
    .ok_or(EventError::InvalidMetadata { key })
}

impl CheckoutCompleted {
  fn from_object(object: serde_json::Value) -> Result<Self, EventError> {
    let raw: RawSession = serde_json::from_value(object)?;

    let session_id = raw.id.filter(|id| !id.is_empty()).ok_or(EventError::MissingField("id"))?;
    let buyer_email = raw
      .customer_details
      .and_then(|d| d.email)
      .or(raw.customer_email)
      .filter(|e| !e.trim().is_empty())
      .ok_or(EventError::MissingField("customer email"))?;

    let metadata = CheckoutMetadata {
      formation_id: metadata_uuid(&raw.metadata, CheckoutMetadata::FORMATION_KEY)?,
      creator_id:   metadata_uuid(&raw.metadata, CheckoutMetadata::CREATOR_KEY)?,
    };

    Ok(Self {
      session_id,
      buyer_email,
      amount_total_minor: raw.amount_total,
      payment_status: raw.payment_status,
      metadata,
    })
  }
}

impl ProviderEvent {
  pub fn parse(payload: VerifiedPayload<'_>) -> Result<Self, EventError> {
    let envelope: Envelope = serde_json::from_slice(payload.body())?;

    match envelope.kind.as_str() {
      CHECKOUT_COMPLETED | CHECKOUT_ASYNC_SUCCEEDED => {
        let kind = envelope.kind.clone();
        let checkout = CheckoutCompleted::from_object(envelope.into_object()?)?;
        Ok(Self::CheckoutCompleted { kind, checkout })
      }
      ACCOUNT_UPDATED => {
        let raw: RawAccount = serde_json::from_value(envelope.into_object()?)?;
        let account = raw.id.filter(|id| !id.is_empty()).ok_or(EventError::MissingField("id"))?;
        Ok(Self::PayoutAccountUpdated(PayoutAccountUpdated {
          account,
          details_submitted: raw.details_submitted,
          charges_enabled: raw.charges_enabled,
        }))
      }
      _ => Ok(Self::Unknown { kind: envelope.kind }),
    }
  }

  pub fn kind(&self) -> &str {
    match self {
      Self::CheckoutCompleted { kind, .. } => kind,
      Self::PayoutAccountUpdated(_) => ACCOUNT_UPDATED,
      Self::Unknown { kind } => kind,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, Utc};
  use serde_json::json;

  use super::*;
  use crate::webhook::WebhookVerifier;

  fn parse(body: serde_json::Value) -> Result<ProviderEvent, EventError> {
    let body = serde_json::to_vec(&body).unwrap();
    let verifier = WebhookVerifier::new("whsec", Duration::seconds(300));
    let header = verifier.sign(&body, Utc::now().timestamp()).unwrap();
    let payload = verifier.verify(&body, Some(&header)).unwrap();
    ProviderEvent::parse(payload)
  }

  #[test]
  fn checkout_session_completed() {
    let formation_id = Uuid::new_v4();
    let creator_id = Uuid::new_v4();
    let event = parse(json!({
      "id": "evt_123",
      "type": "checkout.session.completed",
      "data": { "object": {
        "id": "cs_123",
        "customer_details": { "email": "Buyer@Example.com" },
        "amount_total": 9700,
        "payment_status": "paid",
        "metadata": {
          "formation_id": formation_id.to_string(),
          "creator_id": creator_id.to_string()
        }
      }}
    }))
    .unwrap();

    assert_eq!(event.kind(), CHECKOUT_COMPLETED);
    let ProviderEvent::CheckoutCompleted { checkout: c, .. } = event else {
      panic!("wrong variant: {event:?}")
    };
    assert_eq!(c.session_id, "cs_123");
    assert_eq!(c.buyer_email, "Buyer@Example.com");
    assert_eq!(c.amount_total_minor, Some(9700));
    assert!(c.is_settled());
    assert_eq!(c.metadata, CheckoutMetadata { formation_id, creator_id });
  }

  #[test]
  fn falls_back_to_customer_email_and_reads_unpaid() {
    let event = parse(json!({
      "type": "checkout.session.completed",
      "data": { "object": {
        "id": "cs_1",
        "customer_email": "a@b.co",
        "payment_status": "unpaid",
        "metadata": {
          "formation_id": Uuid::new_v4().to_string(),
          "creator_id": Uuid::new_v4().to_string()
        }
      }}
    }))
    .unwrap();

    let ProviderEvent::CheckoutCompleted { checkout: c, .. } = event else { panic!("wrong variant") };
    assert_eq!(c.buyer_email, "a@b.co");
    assert_eq!(c.payment_status, Some(PaymentStatus::Unpaid));
    assert!(!c.is_settled());
  }

  #[test]
  fn missing_metadata_is_rejected() {
    let err = parse(json!({
      "type": "checkout.session.completed",
      "data": { "object": { "id": "cs_1", "customer_email": "a@b.co", "metadata": {} } }
    }))
    .unwrap_err();
    assert!(matches!(err, EventError::InvalidMetadata { key: "formation_id" }));
  }

  #[test]
  fn account_updated() {
    let event = parse(json!({
      "type": "account.updated",
      "data": { "object": { "id": "acct_1", "details_submitted": true, "charges_enabled": false } }
    }))
    .unwrap();
    let ProviderEvent::PayoutAccountUpdated(a) = event else { panic!("wrong variant") };
    assert_eq!(a.account, "acct_1");
    assert!(!a.is_ready());
  }

  #[test]
  fn unknown_kind_is_kept() {
    let event = parse(json!({ "type": "invoice.paid", "data": { "object": {} } })).unwrap();
    assert_eq!(event, ProviderEvent::Unknown { kind: "invoice.paid".into() });
    assert_eq!(event.kind(), "invoice.paid");
  }

  #[test]
  fn unknown_kind_without_data_is_kept() {
    let event = parse(json!({ "id": "evt_1", "type": "v2.core.event_destination.ping" })).unwrap();
    assert_eq!(event.kind(), "v2.core.event_destination.ping");
  }

  #[test]
  fn known_kind_without_object_is_rejected() {
    let err = parse(json!({ "type": "account.updated", "data": {} })).unwrap_err();
    assert!(matches!(err, EventError::MissingField("data.object")));
    let err = parse(json!({ "type": "checkout.session.completed" })).unwrap_err();
    assert!(matches!(err, EventError::MissingField("data.object")));
  }

  #[test]
  fn async_success_keeps_its_kind() {
    let event = parse(json!({
      "type": "checkout.session.async_payment_succeeded",
      "data": { "object": {
        "id": "cs_9",
        "customer_email": "a@b.co",
        "payment_status": "paid",
        "metadata": {
          "formation_id": Uuid::new_v4().to_string(),
          "creator_id": Uuid::new_v4().to_string()
        }
      }}
    }))
    .unwrap();
    assert_eq!(event.kind(), CHECKOUT_ASYNC_SUCCEEDED);
    assert!(matches!(event, ProviderEvent::CheckoutCompleted { ref checkout, .. } if checkout.session_id == "cs_9"));
  }

  #[test]
  fn invalid_json_is_rejected() {
    let body = b"not json";
    let verifier = WebhookVerifier::new("whsec", Duration::seconds(300));
    let header = verifier.sign(body, Utc::now().timestamp()).unwrap();
    let payload = verifier.verify(body, Some(&header)).unwrap();
    assert!(matches!(ProviderEvent::parse(payload), Err(EventError::Json(_))));
  }
}

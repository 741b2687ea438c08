//! Webhook entry point: verify, parse, route.

use std::sync::Arc;

use formation_core::store::LedgerStore;
use uuid::Uuid;

use crate::{
  error::DispatchError,
  event::{PayoutAccountUpdated, ProviderEvent},
  fulfillment::{Fulfiller, FulfillmentOutcome},
  webhook::WebhookVerifier,
};

/// What a delivery did. Every variant is acknowledged to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
  Fulfilled { purchase_id: Uuid },
  AlreadyFulfilled { purchase_id: Uuid },
  AwaitingPayment,
  PayoutOnboarded { creator_id: Uuid },
  /// The account exists but cannot receive transfers yet, or is not ours.
  PayoutPending,
  Ignored { kind: String },
}

pub struct WebhookDispatcher<S> {
  verifier:  WebhookVerifier,
  fulfiller: Fulfiller<S>,
  store:     Arc<S>,
}

impl<S> Clone for WebhookDispatcher<S> {
  fn clone(&self) -> Self {
    Self {
      verifier:  self.verifier.clone(),
      fulfiller: self.fulfiller.clone(),
      store:     Arc::clone(&self.store),
    }
  }
}

impl<S: LedgerStore> WebhookDispatcher<S> {
  pub fn new(verifier: WebhookVerifier, fulfiller: Fulfiller<S>, store: Arc<S>) -> Self {
    Self { verifier, fulfiller, store }
  }

  /// Handle one raw delivery. `signature` is the signature header value.
  ///
  /// Nothing is parsed or written unless the signature checks out.
  pub async fn dispatch(
    &self,
    body: &[u8],
    signature: Option<&str>,
  ) -> Result<DispatchOutcome, DispatchError> {
    let payload = self.verifier.verify(body, signature).map_err(|e| {
      tracing::warn!(reason = %e, "webhook signature rejected");
      DispatchError::InvalidSignature(e)
    })?;

    let event = ProviderEvent::parse(payload).inspect_err(|e| {
      tracing::warn!(error = %e, "signed webhook payload is unusable");
    })?;
    tracing::debug!(kind = event.kind(), "webhook verified");

    match event {
      ProviderEvent::CheckoutCompleted { checkout: completed, .. } => {
        let outcome = self.fulfiller.fulfill(&completed).await.inspect_err(|e| {
          if e.is_transient() {
            tracing::error!(session_id = %completed.session_id, error = %e, "fulfillment failed");
          } else {
            tracing::warn!(session_id = %completed.session_id, error = %e, "fulfillment rejected");
          }
        })?;
        Ok(match outcome {
          FulfillmentOutcome::Fulfilled { purchase } => {
            DispatchOutcome::Fulfilled { purchase_id: purchase.purchase_id }
          }
          FulfillmentOutcome::AlreadyFulfilled { purchase } => {
            DispatchOutcome::AlreadyFulfilled { purchase_id: purchase.purchase_id }
          }
          FulfillmentOutcome::AwaitingPayment => DispatchOutcome::AwaitingPayment,
        })
      }
      ProviderEvent::PayoutAccountUpdated(update) => self.payout_account_updated(update).await,
      ProviderEvent::Unknown { kind } => {
        tracing::debug!(%kind, "webhook event ignored");
        Ok(DispatchOutcome::Ignored { kind })
      }
    }
  }

  async fn payout_account_updated(
    &self,
    update: PayoutAccountUpdated,
  ) -> Result<DispatchOutcome, DispatchError> {
    if !update.is_ready() {
      return Ok(DispatchOutcome::PayoutPending);
    }

    let creator = self
      .store
      .mark_payout_onboarded(update.account.clone())
      .await
      .map_err(|e| DispatchError::Transient(Box::new(e)))?;

    match creator {
      Some(creator) => {
        tracing::info!(creator_id = %creator.creator_id, "creator payout onboarded");
        Ok(DispatchOutcome::PayoutOnboarded { creator_id: creator.creator_id })
      }
      None => {
        tracing::warn!(account = %update.account, "payout update for unknown account");
        Ok(DispatchOutcome::PayoutPending)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, Utc};
  use formation_core::{
    catalog::{Formation, NewCreator, NewFormation},
    money::{FeeCalculator, FeeRate, Price},
  };
  use formation_store_sqlite::{SqliteStore, Table};
  use rust_decimal_macros::dec;
  use serde_json::json;

  use super::*;
  use crate::{error::SignatureError, notify::NotificationQueue};

  const SECRET: &str = "whsec_dispatch";

  async fn setup() -> (WebhookDispatcher<SqliteStore>, Arc<SqliteStore>, Formation) {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let creator = store
      .create_creator(NewCreator {
        email:          "creator@example.com".into(),
        display_name:   "Creator".into(),
        payout_account: Some("acct_9".into()),
      })
      .await
      .unwrap();
    let formation = store
      .create_formation(NewFormation {
        creator_id: creator.creator_id,
        title:      "Course".into(),
        price:      Price::new(dec!(97)).unwrap(),
        published:  true,
      })
      .await
      .unwrap();

    let (queue, _rx) = NotificationQueue::new();
    let fees = FeeCalculator::new(FeeRate::new(dec!(0.05)).unwrap());
    let fulfiller = Fulfiller::new(Arc::clone(&store), queue, fees, "https://x");
    let verifier = WebhookVerifier::new(SECRET, Duration::seconds(300));
    let dispatcher = WebhookDispatcher::new(verifier, fulfiller, Arc::clone(&store));
    (dispatcher, store, formation)
  }

  fn signed(body: &serde_json::Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(body).unwrap();
    let header = WebhookVerifier::new(SECRET, Duration::seconds(300))
      .sign(&body, Utc::now().timestamp())
      .unwrap();
    (body, header)
  }

  fn checkout_event(formation: &Formation, session_id: &str) -> serde_json::Value {
    json!({
      "id": "evt_1",
      "type": "checkout.session.completed",
      "data": { "object": {
        "id": session_id,
        "customer_email": "buyer@example.com",
        "amount_total": 9700,
        "payment_status": "paid",
        "metadata": {
          "formation_id": formation.formation_id.to_string(),
          "creator_id": formation.creator_id.to_string()
        }
      }}
    })
  }

  #[tokio::test]
  async fn bad_signature_writes_nothing() {
    let (dispatcher, store, formation) = setup().await;
    let (body, _) = signed(&checkout_event(&formation, "cs_1"));

    let err = dispatcher.dispatch(&body, Some("t=1,v1=deadbeef")).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidSignature(SignatureError::Mismatch)));
    assert!(!err.is_retryable());
    assert_eq!(store.count_rows(Table::Purchases).await.unwrap(), 0);
    assert_eq!(store.count_rows(Table::Students).await.unwrap(), 0);

    let err = dispatcher.dispatch(&body, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidSignature(SignatureError::Missing)));
  }

  #[tokio::test]
  async fn checkout_is_fulfilled_once() {
    let (dispatcher, store, formation) = setup().await;
    let (body, header) = signed(&checkout_event(&formation, "evt_123"));

    let first = dispatcher.dispatch(&body, Some(&header)).await.unwrap();
    let DispatchOutcome::Fulfilled { purchase_id } = first else { panic!("{first:?}") };

    let second = dispatcher.dispatch(&body, Some(&header)).await.unwrap();
    assert_eq!(second, DispatchOutcome::AlreadyFulfilled { purchase_id });
    assert_eq!(store.count_rows(Table::Purchases).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn signed_garbage_is_invalid_event() {
    let (dispatcher, _, _) = setup().await;
    let (body, header) = signed(&json!({ "type": "checkout.session.completed", "data": { "object": {} } }));

    let err = dispatcher.dispatch(&body, Some(&header)).await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidEvent(_)));
  }

  #[tokio::test]
  async fn unknown_event_is_acknowledged() {
    let (dispatcher, _, _) = setup().await;
    let (body, header) = signed(&json!({ "type": "customer.created", "data": { "object": {} } }));

    let outcome = dispatcher.dispatch(&body, Some(&header)).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Ignored { kind: "customer.created".into() });
  }

  #[tokio::test]
  async fn account_update_onboards_only_when_ready() {
    let (dispatcher, store, formation) = setup().await;

    let (body, header) = signed(&json!({
      "type": "account.updated",
      "data": { "object": { "id": "acct_9", "details_submitted": true, "charges_enabled": false } }
    }));
    assert_eq!(dispatcher.dispatch(&body, Some(&header)).await.unwrap(), DispatchOutcome::PayoutPending);
    assert!(!store.get_creator(formation.creator_id).await.unwrap().unwrap().payout_onboarded);

    let (body, header) = signed(&json!({
      "type": "account.updated",
      "data": { "object": { "id": "acct_9", "details_submitted": true, "charges_enabled": true } }
    }));
    assert_eq!(
      dispatcher.dispatch(&body, Some(&header)).await.unwrap(),
      DispatchOutcome::PayoutOnboarded { creator_id: formation.creator_id }
    );
    let formation = store.get_formation(formation.formation_id).await.unwrap().unwrap();
    assert!(formation.accepts_payment());
  }

  #[tokio::test]
  async fn account_update_for_unknown_account_is_acknowledged() {
    let (dispatcher, _, _) = setup().await;
    let (body, header) = signed(&json!({
      "type": "account.updated",
      "data": { "object": { "id": "acct_other", "details_submitted": true, "charges_enabled": true } }
    }));
    assert_eq!(dispatcher.dispatch(&body, Some(&header)).await.unwrap(), DispatchOutcome::PayoutPending);
  }
}

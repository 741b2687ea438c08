//! Turning a confirmed payment into a purchase.
//!
//! Every step is safe to repeat. The provider may deliver the same event any
//! number of times, concurrently, and the ledger still ends up with one
//! purchase per transaction and the buyer with one set of notifications.

use std::sync::Arc;

use formation_core::{
  catalog::Formation,
  ledger::{NewPurchase, NewStudent, Purchase, Student, display_name_from_email, normalize_email},
  money::{FeeCalculator, Price},
  store::LedgerStore,
};

use crate::{
  credential::{generate_temporary_credential, hash_credential},
  error::FulfillmentError,
  event::CheckoutCompleted,
  notify::{Notification, NotificationQueue},
};

#[derive(Debug, Clone)]
pub enum FulfillmentOutcome {
  /// This delivery created the purchase.
  Fulfilled { purchase: Purchase },
  /// The purchase already existed; nothing was changed or sent.
  AlreadyFulfilled { purchase: Purchase },
  /// The session is not paid yet. A later event will carry the payment.
  AwaitingPayment,
}

fn store_err<E>(e: E) -> FulfillmentError
where
  E: std::error::Error + Send + Sync + 'static,
{
  FulfillmentError::Store(Box::new(e))
}

pub struct Fulfiller<S> {
  store:         Arc<S>,
  notifications: NotificationQueue,
  fees:          FeeCalculator,
  base_url:      String,
}

impl<S> Clone for Fulfiller<S> {
  fn clone(&self) -> Self {
    Self {
      store:         Arc::clone(&self.store),
      notifications: self.notifications.clone(),
      fees:          self.fees,
      base_url:      self.base_url.clone(),
    }
  }
}

impl<S: LedgerStore> Fulfiller<S> {
  pub fn new(
    store: Arc<S>,
    notifications: NotificationQueue,
    fees: FeeCalculator,
    base_url: impl Into<String>,
  ) -> Self {
    Self {
      store,
      notifications,
      fees,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
    }
  }

  pub fn access_link(&self, formation_id: uuid::Uuid) -> String {
    format!("{}/formations/{formation_id}/learn", self.base_url)
  }

  pub async fn fulfill(
    &self,
    event: &CheckoutCompleted,
  ) -> Result<FulfillmentOutcome, FulfillmentError> {
    if !event.is_settled() {
      tracing::info!(session_id = %event.session_id, "checkout not paid yet");
      return Ok(FulfillmentOutcome::AwaitingPayment);
    }

    // Redeliveries stop here without issuing a credential.
    if let Some(purchase) = self
      .store
      .get_purchase_by_reference(event.session_id.clone())
      .await
      .map_err(store_err)?
    {
      return Ok(FulfillmentOutcome::AlreadyFulfilled { purchase });
    }

    let formation = self.formation_for(event).await?;
    let email = normalize_email(&event.buyer_email)
      .map_err(|_| FulfillmentError::InvalidEmail(event.buyer_email.clone()))?;
    let price = match event.amount_total_minor {
      Some(minor) => {
        Price::from_minor_units(minor).map_err(|_| FulfillmentError::InvalidAmount(minor))?
      }
      None => formation.price,
    };

    let (student, created_credential) = self.resolve_student(email).await?;

    let inserted = self
      .store
      .insert_purchase(NewPurchase {
        student_id:         student.student_id,
        formation_id:       formation.formation_id,
        amount:             price.value(),
        external_reference: event.session_id.clone(),
      })
      .await
      .map_err(store_err)?;

    if !inserted.created {
      return Ok(FulfillmentOutcome::AlreadyFulfilled { purchase: inserted.record });
    }

    let purchase = inserted.record;
    let temporary_credential = self.claim_credential(&student, created_credential).await;
    tracing::info!(
      purchase_id = %purchase.purchase_id,
      formation_id = %formation.formation_id,
      student_id = %student.student_id,
      amount = %purchase.amount,
      "purchase recorded"
    );

    self.notifications.enqueue(Notification::buyer_welcome(
      &student.email,
      &formation.title,
      &self.access_link(formation.formation_id),
      temporary_credential.as_deref(),
    ));
    self.notify_creator(&formation, &student, price).await;

    Ok(FulfillmentOutcome::Fulfilled { purchase })
  }

  async fn formation_for(&self, event: &CheckoutCompleted) -> Result<Formation, FulfillmentError> {
    let formation_id = event.metadata.formation_id;
    let formation = self
      .store
      .get_formation(formation_id)
      .await
      .map_err(store_err)?
      .ok_or(FulfillmentError::UnknownFormation(formation_id))?;

    if formation.creator_id != event.metadata.creator_id {
      return Err(FulfillmentError::CreatorMismatch {
        formation_id,
        claimed: event.metadata.creator_id,
      });
    }
    Ok(formation)
  }

  /// The buyer's student record, plus the plaintext credential when this
  /// call created it.
  async fn resolve_student(
    &self,
    email: String,
  ) -> Result<(Student, Option<String>), FulfillmentError> {
    if let Some(student) = self.store.find_student_by_email(email.clone()).await.map_err(store_err)? {
      return Ok((student, None));
    }

    let credential = generate_temporary_credential();
    let credential_hash =
      hash_credential(&credential).map_err(|e| FulfillmentError::Credential(e.to_string()))?;
    let upserted = self
      .store
      .upsert_student(NewStudent {
        display_name: display_name_from_email(&email),
        email,
        credential_hash,
      })
      .await
      .map_err(store_err)?;

    let credential = upserted.created.then_some(credential);
    Ok((upserted.record, credential))
  }

  /// The credential to send with this purchase, if any.
  ///
  /// A buyer is sent exactly one credential, and it is the one stored. The
  /// delivery that created the account offers its own; a delivery finding an
  /// account whose credential was never sent (its creator failed, or has not
  /// reached this point yet) offers a replacement. Whichever claims first
  /// sends, the others send none.
  async fn claim_credential(&self, student: &Student, created: Option<String>) -> Option<String> {
    if student.credential_sent {
      return None;
    }

    let (credential, replacement) = match created {
      Some(credential) => (credential, None),
      None => {
        let credential = generate_temporary_credential();
        match hash_credential(&credential) {
          Ok(hash) => (credential, Some(hash)),
          Err(e) => {
            tracing::error!(student_id = %student.student_id, error = %e, "could not issue credential");
            return None;
          }
        }
      }
    };

    let claimed = self
      .store
      .claim_credential_delivery(student.student_id, student.credential_hash.clone(), replacement)
      .await;
    match claimed {
      Ok(true) => Some(credential),
      Ok(false) => {
        tracing::debug!(student_id = %student.student_id, "credential already sent by another delivery");
        None
      }
      Err(e) => {
        tracing::error!(student_id = %student.student_id, error = %e, "could not record credential delivery");
        None
      }
    }
  }

  async fn notify_creator(&self, formation: &Formation, student: &Student, price: Price) {
    let creator = match self.store.get_creator(formation.creator_id).await {
      Ok(Some(creator)) => creator,
      Ok(None) => {
        tracing::warn!(creator_id = %formation.creator_id, "sale notification skipped: creator missing");
        return;
      }
      Err(e) => {
        tracing::warn!(creator_id = %formation.creator_id, error = %e, "sale notification skipped");
        return;
      }
    };

    let split = self.fees.split(price);
    self.notifications.enqueue(Notification::creator_sale(
      &creator.email,
      &formation.title,
      &student.email,
      split.gross(),
      split.net_to_creator(),
    ));
  }
}

//! Checkout intent construction.
//!
//! Building an intent has no effect on the ledger. The purchase only exists
//! once the provider confirms payment through a webhook, because the buyer
//! may abandon the hosted checkout at any point.

use formation_core::{
  catalog::Formation,
  ledger::normalize_email,
  money::{FeeCalculator, FeeSplit},
  store::LedgerStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  error::CheckoutError,
  provider::{CheckoutSession, PaymentProvider},
};

// ─── Intent ──────────────────────────────────────────────────────────────────

/// The correlation data the webhook needs to reconstruct the sale.
///
/// It round-trips through the provider as string metadata and is the only
/// link between a completed payment and the formation that was sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
  pub formation_id: Uuid,
  pub creator_id:   Uuid,
}

impl CheckoutMetadata {
  pub const FORMATION_KEY: &'static str = "formation_id";
  pub const CREATOR_KEY: &'static str = "creator_id";

  pub fn pairs(&self) -> [(&'static str, String); 2] {
    [
      (Self::FORMATION_KEY, self.formation_id.to_string()),
      (Self::CREATOR_KEY, self.creator_id.to_string()),
    ]
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
  pub name:              String,
  pub unit_amount_minor: i64,
  pub currency:          String,
  pub quantity:          u32,
}

/// Split instructions executed by the provider at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInstructions {
  pub application_fee_minor: i64,
  /// The creator's payout account.
  pub destination:           String,
}

/// Everything the provider needs to host one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutIntent {
  pub buyer_email: String,
  pub line_item:   LineItem,
  pub success_url: String,
  pub cancel_url:  String,
  pub metadata:    CheckoutMetadata,
  pub transfer:    TransferInstructions,
  pub split:       FeeSplit,
}

// ─── Builder ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CheckoutIntentBuilder {
  fees:     FeeCalculator,
  base_url: String,
  currency: String,
}

impl CheckoutIntentBuilder {
  pub fn new(fees: FeeCalculator, base_url: impl Into<String>, currency: impl Into<String>) -> Self {
    Self {
      fees,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
      currency: currency.into().to_lowercase(),
    }
  }

  pub fn success_url(&self, formation_id: Uuid) -> String {
    format!("{}/formations/{formation_id}?checkout=success", self.base_url)
  }

  pub fn cancel_url(&self, formation_id: Uuid) -> String {
    format!("{}/formations/{formation_id}?checkout=cancelled", self.base_url)
  }

  /// Look up the formation and build its intent for `buyer_email`.
  pub async fn build<S>(
    &self,
    store: &S,
    formation_id: Uuid,
    buyer_email: &str,
  ) -> Result<CheckoutIntent, CheckoutError>
  where
    S: LedgerStore,
  {
    let buyer_email =
      normalize_email(buyer_email).map_err(|_| CheckoutError::InvalidEmail(buyer_email.to_owned()))?;

    let formation = store
      .get_formation(formation_id)
      .await
      .map_err(|e| CheckoutError::Store(Box::new(e)))?
      .filter(|f| f.published)
      .ok_or(CheckoutError::FormationNotFound(formation_id))?;

    self.intent_for(&formation, buyer_email)
  }

  /// Build the intent for an already-loaded formation.
  pub fn intent_for(
    &self,
    formation: &Formation,
    buyer_email: String,
  ) -> Result<CheckoutIntent, CheckoutError> {
    let destination = match (&formation.payout_account, formation.payout_onboarded) {
      (Some(account), true) => account.clone(),
      _ => return Err(CheckoutError::PayoutNotConfigured(formation.formation_id)),
    };

    let split = self.fees.split(formation.price);

    Ok(CheckoutIntent {
      buyer_email,
      line_item: LineItem {
        name:              formation.title.clone(),
        unit_amount_minor: split.gross_minor_units,
        currency:          self.currency.clone(),
        quantity:          1,
      },
      success_url: self.success_url(formation.formation_id),
      cancel_url: self.cancel_url(formation.formation_id),
      metadata: CheckoutMetadata {
        formation_id: formation.formation_id,
        creator_id:   formation.creator_id,
      },
      transfer: TransferInstructions {
        application_fee_minor: split.platform_fee_minor_units,
        destination,
      },
      split,
    })
  }
}

/// Build an intent and open a hosted checkout for it.
pub async fn initiate_checkout<S, P>(
  store: &S,
  provider: &P,
  builder: &CheckoutIntentBuilder,
  formation_id: Uuid,
  buyer_email: &str,
) -> Result<CheckoutSession, CheckoutError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let intent = builder.build(store, formation_id, buyer_email).await?;
  let session = provider.create_checkout_session(&intent).await?;
  tracing::info!(
    %formation_id,
    session_id = %session.id,
    gross = intent.split.gross_minor_units,
    fee = intent.split.platform_fee_minor_units,
    "checkout session created"
  );
  Ok(session)
}

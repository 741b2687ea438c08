//! `POST /checkout`: open a hosted checkout for a formation.
//!
//! Body: `{"formationId": "...", "buyerEmail": "..."}`. Answers
//! `{"redirectUrl": "...", "sessionId": "..."}`; nothing is written to the
//! ledger until the provider confirms payment.

use axum::{Json, extract::State};
use formation_core::store::LedgerStore;
use formation_payments::{PaymentProvider, initiate_checkout};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError, extract::ApiJson};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
  pub formation_id: Uuid,
  pub buyer_email:  String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
  pub redirect_url: String,
  pub session_id:   String,
}

pub async fn create<S, P>(
  State(state): State<AppState<S, P>>,
  ApiJson(body): ApiJson<CheckoutBody>,
) -> Result<Json<CheckoutResponse>, ApiError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let session = initiate_checkout(
    state.store.as_ref(),
    state.provider.as_ref(),
    &state.checkout,
    body.formation_id,
    &body.buyer_email,
  )
  .await?;

  Ok(Json(CheckoutResponse { redirect_url: session.url, session_id: session.id }))
}

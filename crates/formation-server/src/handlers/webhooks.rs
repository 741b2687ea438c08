//! `POST /webhooks/payments`: provider event callback.
//!
//! The body is taken as raw bytes; the signature covers them exactly as
//! sent. `200` acknowledges (including ignored and replayed events), `400`
//! tells the provider not to retry, `500` asks it to.

use axum::{Json, extract::State, http::HeaderMap};
use bytes::Bytes;
use formation_core::store::LedgerStore;
use formation_payments::{DispatchOutcome, PaymentProvider, SIGNATURE_HEADER};
use serde_json::{Value, json};

use crate::{AppState, error::ApiError};

pub async fn receive<S, P>(
  State(state): State<AppState<S, P>>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<Value>, ApiError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
  let outcome = state.webhooks.dispatch(&body, signature).await?;

  let status = match outcome {
    DispatchOutcome::Fulfilled { .. } => "fulfilled",
    DispatchOutcome::AlreadyFulfilled { .. } => "duplicate",
    DispatchOutcome::AwaitingPayment => "awaiting_payment",
    DispatchOutcome::PayoutOnboarded { .. } => "payout_onboarded",
    DispatchOutcome::PayoutPending => "payout_pending",
    DispatchOutcome::Ignored { .. } => "ignored",
  };
  Ok(Json(json!({ "received": true, "status": status })))
}

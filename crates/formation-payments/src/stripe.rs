//! A Stripe-compatible [`PaymentProvider`] over HTTPS.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::{
  checkout::CheckoutIntent,
  error::ProviderError,
  provider::{CheckoutSession, PaymentProvider},
};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Connection settings for the provider API.
#[derive(Debug, Clone)]
pub struct StripeConfig {
  pub api_base:   String,
  pub secret_key: String,
}

/// Clones share one connection pool.
#[derive(Clone)]
pub struct StripeClient {
  client: Client,
  config: StripeConfig,
}

#[derive(Deserialize)]
struct SessionResponse {
  id:  String,
  url: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
  error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

impl StripeClient {
  pub fn new(config: StripeConfig) -> Result<Self, ProviderError> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
  }
}

/// Form fields for `POST /v1/checkout/sessions`.
///
/// The correlation metadata is set on both the session and its payment
/// intent so either object can be traced back to the sale.
pub fn checkout_form(intent: &CheckoutIntent) -> Vec<(String, String)> {
  let mut form: Vec<(String, String)> = vec![
    ("mode".into(), "payment".into()),
    ("customer_email".into(), intent.buyer_email.clone()),
    ("success_url".into(), intent.success_url.clone()),
    ("cancel_url".into(), intent.cancel_url.clone()),
    ("line_items[0][quantity]".into(), intent.line_item.quantity.to_string()),
    ("line_items[0][price_data][currency]".into(), intent.line_item.currency.clone()),
    (
      "line_items[0][price_data][unit_amount]".into(),
      intent.line_item.unit_amount_minor.to_string(),
    ),
    ("line_items[0][price_data][product_data][name]".into(), intent.line_item.name.clone()),
    (
      "payment_intent_data[application_fee_amount]".into(),
      intent.transfer.application_fee_minor.to_string(),
    ),
    (
      "payment_intent_data[transfer_data][destination]".into(),
      intent.transfer.destination.clone(),
    ),
  ];

  for (key, value) in intent.metadata.pairs() {
    form.push((format!("metadata[{key}]"), value.clone()));
    form.push((format!("payment_intent_data[metadata][{key}]"), value));
  }

  form
}

impl PaymentProvider for StripeClient {
  async fn create_checkout_session(
    &self,
    intent: &CheckoutIntent,
  ) -> Result<CheckoutSession, ProviderError> {
    let resp = self
      .client
      .post(self.url("/v1/checkout/sessions"))
      .bearer_auth(&self.config.secret_key)
      .form(&checkout_form(intent))
      .send()
      .await?;

    let status = resp.status();
    if !status.is_success() {
      let message = resp
        .json::<ErrorResponse>()
        .await
        .ok()
        .and_then(|e| e.error.message)
        .unwrap_or_else(|| status.to_string());
      return Err(ProviderError::Rejected { status: status.as_u16(), message });
    }

    let session: SessionResponse = resp.json().await?;
    let url = session
      .url
      .ok_or_else(|| ProviderError::InvalidResponse(format!("session {} has no url", session.id)))?;
    Ok(CheckoutSession { id: session.id, url })
  }
}

//! HTTP surface of the formation marketplace.
//!
//! Exposes an axum [`Router`] over any [`LedgerStore`] and
//! [`PaymentProvider`]. Checkout and the payment webhook are public; the
//! learner endpoints require buyer credentials.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | `POST` | `/checkout` | none |
//! | `POST` | `/webhooks/payments` | provider signature |
//! | `POST` | `/progress` | buyer |
//! | `GET`  | `/progress?formationId=` | buyer |
//! | `GET`  | `/progress/summary?formationId=` | buyer |
//! | `GET`  | `/formations/{id}/content` | buyer |

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use chrono::Duration;
use formation_core::{
  money::{FeeCalculator, FeeRate},
  store::LedgerStore,
};
use formation_payments::{
  CheckoutIntentBuilder, DEFAULT_MAX_IN_FLIGHT, Fulfiller, NotificationQueue, PaymentProvider,
  WebhookDispatcher, WebhookVerifier, stripe::DEFAULT_API_BASE, webhook::DEFAULT_TOLERANCE_SECS,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use handlers::{checkout, content, progress, webhooks};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `formation.toml` and
/// `FORMATION_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  /// Root for redirect and access links, e.g. `https://learn.example.com`.
  pub base_url:               String,
  pub store_path:             PathBuf,
  pub provider_secret_key:    String,
  #[serde(default = "default_api_base")]
  pub provider_api_base:      String,
  pub webhook_secret:         String,
  #[serde(default = "default_tolerance")]
  pub webhook_tolerance_secs: i64,
  #[serde(default = "default_fee_rate")]
  pub platform_fee_rate:      Decimal,
  #[serde(default = "default_currency")]
  pub currency:               String,
  /// Notifications are only logged when unset.
  #[serde(default)]
  pub notify_url:             Option<String>,
  #[serde(default = "default_notify_attempts")]
  pub notify_max_attempts:    u32,
  #[serde(default = "default_notify_in_flight")]
  pub notify_max_in_flight:   usize,
}

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_api_base() -> String { DEFAULT_API_BASE.to_owned() }
fn default_tolerance() -> i64 { DEFAULT_TOLERANCE_SECS }
fn default_fee_rate() -> Decimal { Decimal::new(5, 2) }
fn default_currency() -> String { "eur".to_owned() }
fn default_notify_attempts() -> u32 { 3 }
fn default_notify_in_flight() -> usize { DEFAULT_MAX_IN_FLIGHT }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, P> {
  pub store:    Arc<S>,
  pub provider: Arc<P>,
  pub checkout: Arc<CheckoutIntentBuilder>,
  pub webhooks: Arc<WebhookDispatcher<S>>,
}

impl<S, P> Clone for AppState<S, P> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      provider: Arc::clone(&self.provider),
      checkout: Arc::clone(&self.checkout),
      webhooks: Arc::clone(&self.webhooks),
    }
  }
}

impl<S, P> AppState<S, P>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  /// Wire the checkout builder and webhook pipeline from `config`.
  pub fn new(
    store: Arc<S>,
    provider: P,
    config: &ServerConfig,
    notifications: NotificationQueue,
  ) -> formation_core::Result<Self> {
    let fees = FeeCalculator::new(FeeRate::new(config.platform_fee_rate)?);
    let checkout = CheckoutIntentBuilder::new(fees, &config.base_url, &config.currency);

    let verifier = WebhookVerifier::new(
      config.webhook_secret.as_bytes(),
      Duration::seconds(config.webhook_tolerance_secs),
    );
    let fulfiller = Fulfiller::new(Arc::clone(&store), notifications, fees, &config.base_url);
    let webhooks = WebhookDispatcher::new(verifier, fulfiller, Arc::clone(&store));

    Ok(Self {
      store,
      provider: Arc::new(provider),
      checkout: Arc::new(checkout),
      webhooks: Arc::new(webhooks),
    })
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application router for `state`.
pub fn router<S, P>(state: AppState<S, P>) -> Router
where
  S: LedgerStore + 'static,
  P: PaymentProvider + 'static,
{
  Router::new()
    .route("/checkout",                 post(checkout::create::<S, P>))
    .route("/webhooks/payments",        post(webhooks::receive::<S, P>))
    .route("/progress",                 get(progress::list::<S, P>).post(progress::record::<S, P>))
    .route("/progress/summary",         get(progress::summary::<S, P>))
    .route("/formations/{id}/content",  get(content::outline::<S, P>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;

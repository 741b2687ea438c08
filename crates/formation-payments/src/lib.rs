//! Payment fulfillment pipeline.
//!
//! ```text
//! checkout ──► provider ──► webhook ──► verify ──► parse ──► dispatch
//!                                                            │
//!                                      fulfillment ◄─────────┤
//!                                      (ledger + notify)     └─► payout onboarding
//! ```
//!
//! The payment provider is reached through the injected [`PaymentProvider`]
//! trait; nothing in this crate holds process-wide client state.

pub mod checkout;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod fulfillment;
pub mod notify;
pub mod provider;
pub mod stripe;
pub mod webhook;

pub use checkout::{CheckoutIntent, CheckoutIntentBuilder, initiate_checkout};
pub use dispatch::{DispatchOutcome, WebhookDispatcher};
pub use error::{
  CheckoutError, DispatchError, EventError, FulfillmentError, NotifyError, ProviderError,
  SignatureError,
};
pub use event::{CheckoutCompleted, PayoutAccountUpdated, ProviderEvent};
pub use fulfillment::{Fulfiller, FulfillmentOutcome};
pub use notify::{
  DEFAULT_MAX_IN_FLIGHT, HttpNotifier, LogNotifier, Notification, NotificationQueue, Notifier,
  RetryPolicy, spawn_dispatcher,
};
pub use provider::{CheckoutSession, PaymentProvider};
pub use stripe::{StripeClient, StripeConfig};
pub use webhook::{SIGNATURE_HEADER, VerifiedPayload, WebhookVerifier};

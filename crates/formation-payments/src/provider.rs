//! The outbound half of the provider contract.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{checkout::CheckoutIntent, error::ProviderError};

/// A hosted checkout page created at the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
  pub id:  String,
  /// Where to send the buyer.
  pub url: String,
}

/// A payment provider able to host a checkout for a [`CheckoutIntent`].
///
/// Passed explicitly to whoever needs it, so tests can substitute a fake.
pub trait PaymentProvider: Send + Sync {
  fn create_checkout_session<'a>(
    &'a self,
    intent: &'a CheckoutIntent,
  ) -> impl Future<Output = Result<CheckoutSession, ProviderError>> + Send + 'a;
}

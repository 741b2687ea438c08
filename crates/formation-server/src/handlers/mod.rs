//! Route handlers, one module per resource.

pub mod checkout;
pub mod content;
pub mod progress;
pub mod webhooks;

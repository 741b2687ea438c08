//! Outbound buyer and creator notifications.
//!
//! Fulfillment only enqueues; delivery happens on a background task so a slow
//! or failing notification channel never holds up a webhook response or
//! rolls back a purchase.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::{
  sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
  task::{JoinHandle, JoinSet},
};

use crate::error::NotifyError;

// ─── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
  BuyerWelcome,
  CreatorSale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub template:   TemplateKind,
  pub recipient:  String,
  pub parameters: BTreeMap<String, String>,
}

impl Notification {
  /// Access details for a buyer. `temporary_credential` is only set when the
  /// buyer account was created by this purchase.
  pub fn buyer_welcome(
    recipient: &str,
    formation_title: &str,
    access_link: &str,
    temporary_credential: Option<&str>,
  ) -> Self {
    let mut parameters = BTreeMap::from([
      ("formation_title".to_owned(), formation_title.to_owned()),
      ("access_link".to_owned(), access_link.to_owned()),
      ("login_email".to_owned(), recipient.to_owned()),
    ]);
    if let Some(credential) = temporary_credential {
      parameters.insert("temporary_credential".to_owned(), credential.to_owned());
    }
    Self { template: TemplateKind::BuyerWelcome, recipient: recipient.to_owned(), parameters }
  }

  pub fn creator_sale(
    recipient: &str,
    formation_title: &str,
    buyer_email: &str,
    amount: Decimal,
    net_amount: Decimal,
  ) -> Self {
    let parameters = BTreeMap::from([
      ("formation_title".to_owned(), formation_title.to_owned()),
      ("buyer_email".to_owned(), buyer_email.to_owned()),
      ("amount".to_owned(), amount.to_string()),
      ("net_amount".to_owned(), net_amount.to_string()),
    ]);
    Self { template: TemplateKind::CreatorSale, recipient: recipient.to_owned(), parameters }
  }
}

// ─── Notifiers ───────────────────────────────────────────────────────────────

pub trait Notifier: Send + Sync + 'static {
  fn send<'a>(
    &'a self,
    notification: &'a Notification,
  ) -> impl Future<Output = Result<(), NotifyError>> + Send + 'a;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
    // Parameters may hold a credential; they stay out of the log.
    tracing::info!(
      template = ?notification.template,
      recipient = %notification.recipient,
      "notification"
    );
    Ok(())
  }
}

/// POSTs each notification as JSON to a relay endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
  client: Client,
  url:    String,
}

impl HttpNotifier {
  pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { client, url: url.into() })
  }
}

impl Notifier for HttpNotifier {
  async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
    let resp = self.client.post(&self.url).json(notification).send().await?;
    let status = resp.status();
    if status.is_success() { Ok(()) } else { Err(NotifyError::Status(status.as_u16())) }
  }
}

// ─── Queue ───────────────────────────────────────────────────────────────────

/// Producer half of the notification channel.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
  tx: UnboundedSender<Notification>,
}

#[derive(Debug)]
pub struct NotificationReceiver {
  rx: UnboundedReceiver<Notification>,
}

impl NotificationQueue {
  pub fn new() -> (Self, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, NotificationReceiver { rx })
  }

  /// Never blocks and never fails the caller.
  pub fn enqueue(&self, notification: Notification) {
    if let Err(e) = self.tx.send(notification) {
      tracing::warn!(
        template = ?e.0.template,
        recipient = %e.0.recipient,
        "notification dropped: dispatcher is gone"
      );
    }
  }
}

impl NotificationReceiver {
  pub async fn recv(&mut self) -> Option<Notification> { self.rx.recv().await }

  pub fn try_recv(&mut self) -> Option<Notification> { self.rx.try_recv().ok() }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  /// Multiplied by the attempt number between attempts.
  pub backoff:      Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, backoff: Duration::from_millis(500) } }
}

/// Deliveries the dispatcher runs at once unless told otherwise.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Send one notification, retrying per `policy`. Returns the number of
/// attempts used on success.
pub async fn deliver<N: Notifier>(
  notifier: &N,
  notification: &Notification,
  policy: RetryPolicy,
) -> Result<u32, NotifyError> {
  let max_attempts = policy.max_attempts.max(1);
  let mut attempt = 1;
  loop {
    match notifier.send(notification).await {
      Ok(()) => return Ok(attempt),
      Err(e) if attempt >= max_attempts => return Err(e),
      Err(e) => {
        tracing::debug!(attempt, error = %e, "notification attempt failed");
        tokio::time::sleep(policy.backoff * attempt).await;
        attempt += 1;
      }
    }
  }
}

/// Drain `rx` until every [`NotificationQueue`] is dropped, delivering each
/// notification on its own task with at most `max_in_flight` running at
/// once; the rest wait in the queue. In-flight deliveries finish before the
/// returned handle completes.
pub fn spawn_dispatcher<N: Notifier>(
  notifier: Arc<N>,
  mut rx: NotificationReceiver,
  policy: RetryPolicy,
  max_in_flight: usize,
) -> JoinHandle<()> {
  let max_in_flight = max_in_flight.max(1);
  tokio::spawn(async move {
    let mut in_flight = JoinSet::new();
    while let Some(notification) = rx.recv().await {
      while in_flight.try_join_next().is_some() {}
      while in_flight.len() >= max_in_flight {
        in_flight.join_next().await;
      }

      let notifier = Arc::clone(&notifier);
      in_flight.spawn(async move {
        if let Err(e) = deliver(notifier.as_ref(), &notification, policy).await {
          tracing::error!(
            template = ?notification.template,
            recipient = %notification.recipient,
            error = %e,
            "notification delivery failed"
          );
        }
      });
    }
    while in_flight.join_next().await.is_some() {}
  })
}

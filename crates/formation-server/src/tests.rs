//! Router tests against an in-memory store and a recording provider.

use std::{
  path::PathBuf,
  sync::{Arc, Mutex},
};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use chrono::Utc;
use formation_core::{
  catalog::{Formation, Lesson, LessonKind, NewCreator, NewFormation, NewLesson, NewModule},
  ledger::NewStudent,
  money::Price,
  store::LedgerStore,
};
use formation_payments::{
  CheckoutIntent, CheckoutSession, NotificationQueue, PaymentProvider, ProviderError,
  credential::hash_credential,
  notify::{NotificationReceiver, TemplateKind},
};
use formation_store_sqlite::{SqliteStore, Table};
use hmac::{Hmac, Mac};
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt as _;
use uuid::Uuid;

use super::*;

const WEBHOOK_SECRET: &str = "whsec_router_tests";

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct RecordingProvider {
  intents: Arc<Mutex<Vec<CheckoutIntent>>>,
}

impl PaymentProvider for RecordingProvider {
  async fn create_checkout_session(
    &self,
    intent: &CheckoutIntent,
  ) -> Result<CheckoutSession, ProviderError> {
    self.intents.lock().unwrap().push(intent.clone());
    Ok(CheckoutSession {
      id:  "cs_test_1".into(),
      url: "https://checkout.example.com/pay/cs_test_1".into(),
    })
  }
}

struct Harness {
  store:     Arc<SqliteStore>,
  provider:  RecordingProvider,
  rx:        NotificationReceiver,
  state:     AppState<SqliteStore, RecordingProvider>,
  formation: Formation,
  lessons:   Vec<Lesson>,
}

fn config() -> ServerConfig {
  ServerConfig {
    host:                   "127.0.0.1".to_string(),
    port:                   8080,
    base_url:               "https://learn.example.com".to_string(),
    store_path:             PathBuf::from(":memory:"),
    provider_secret_key:    "sk_test".to_string(),
    provider_api_base:      "http://127.0.0.1:9".to_string(),
    webhook_secret:         WEBHOOK_SECRET.to_string(),
    webhook_tolerance_secs: 300,
    platform_fee_rate:      dec!(0.05),
    currency:               "eur".to_string(),
    notify_url:             None,
    notify_max_attempts:    3,
    notify_max_in_flight:   4,
  }
}

async fn harness(onboarded: bool) -> Harness {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let creator = store
    .create_creator(NewCreator {
      email:          "creator@example.com".into(),
      display_name:   "Creator".into(),
      payout_account: Some("acct_router".into()),
    })
    .await
    .unwrap();
  if onboarded {
    store.mark_payout_onboarded("acct_router".into()).await.unwrap();
  }
  let formation = store
    .create_formation(NewFormation {
      creator_id: creator.creator_id,
      title:      "Rust in Depth".into(),
      price:      Price::new(dec!(97.00)).unwrap(),
      published:  true,
    })
    .await
    .unwrap();
  let module = store
    .add_module(NewModule {
      formation_id: formation.formation_id,
      title:        "Ownership".into(),
      position:     1,
    })
    .await
    .unwrap();
  let mut lessons = Vec::new();
  for position in 0..2 {
    lessons.push(
      store
        .add_lesson(NewLesson {
          module_id: module.module_id,
          title:     format!("Part {position}"),
          kind:      LessonKind::Video,
          content:   format!("https://cdn.example.com/{position}.mp4"),
          position,
        })
        .await
        .unwrap(),
    );
  }

  let provider = RecordingProvider::default();
  let (queue, rx) = NotificationQueue::new();
  let state =
    AppState::new(Arc::clone(&store), provider.clone(), &config(), queue).unwrap();

  Harness { store, provider, rx, state, formation, lessons }
}

async fn send(state: &AppState<SqliteStore, RecordingProvider>, req: Request<Body>) -> Response {
  router(state.clone()).oneshot(req).await.unwrap()
}

async fn body_json(res: Response) -> Value {
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
  Request::builder()
    .method(method)
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

fn basic(email: &str, credential: &str) -> String {
  format!("Basic {}", B64.encode(format!("{email}:{credential}")))
}

/// The header the provider would send: HMAC-SHA256 over `"{t}.{body}"`.
fn provider_signature(body: &[u8], timestamp: i64) -> String {
  let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
  mac.update(format!("{timestamp}.").as_bytes());
  mac.update(body);
  format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn webhook(body: &Value, signature: Option<&str>) -> Request<Body> {
  let mut builder = Request::builder()
    .method("POST")
    .uri("/webhooks/payments")
    .header(header::CONTENT_TYPE, "application/json");
  if let Some(signature) = signature {
    builder = builder.header("Signature", signature);
  }
  builder.body(Body::from(body.to_string())).unwrap()
}

fn signed_webhook(body: &Value) -> Request<Body> {
  let signature = provider_signature(body.to_string().as_bytes(), Utc::now().timestamp());
  webhook(body, Some(&signature))
}

fn checkout_completed(formation: &Formation, session_id: &str, email: &str) -> Value {
  json!({
    "id": format!("evt_{session_id}"),
    "type": "checkout.session.completed",
    "data": { "object": {
      "id": session_id,
      "customer_details": { "email": email },
      "amount_total": 9700,
      "payment_status": "paid",
      "metadata": {
        "formation_id": formation.formation_id.to_string(),
        "creator_id": formation.creator_id.to_string()
      }
    }}
  })
}

/// Run a paid checkout through the webhook and return the buyer's credential.
async fn buy(h: &mut Harness, email: &str) -> String {
  let res = send(&h.state, signed_webhook(&checkout_completed(&h.formation, "cs_buy", email))).await;
  assert_eq!(res.status(), StatusCode::OK);
  let welcome = std::iter::from_fn(|| h.rx.try_recv())
    .find(|n| n.template == TemplateKind::BuyerWelcome)
    .unwrap();
  welcome.parameters["temporary_credential"].clone()
}

// ─── Checkout ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_returns_provider_redirect() {
  let h = harness(true).await;
  let body = json!({ "formationId": h.formation.formation_id, "buyerEmail": "Buyer@Example.com" });

  let res = send(&h.state, json_request("POST", "/checkout", &body)).await;
  assert_eq!(res.status(), StatusCode::OK);
  let json = body_json(res).await;
  assert_eq!(json["redirectUrl"], "https://checkout.example.com/pay/cs_test_1");

  let intents = h.provider.intents.lock().unwrap().clone();
  assert_eq!(intents.len(), 1);
  assert_eq!(intents[0].buyer_email, "buyer@example.com");
  assert_eq!(intents[0].transfer.application_fee_minor, 485);
  assert_eq!(intents[0].transfer.destination, "acct_router");
  assert_eq!(
    intents[0].success_url,
    format!("https://learn.example.com/formations/{}?checkout=success", h.formation.formation_id)
  );

  // Starting a checkout records nothing.
  assert_eq!(h.store.count_rows(Table::Purchases).await.unwrap(), 0);
}

#[tokio::test]
async fn checkout_without_payout_account_is_refused() {
  let h = harness(false).await;
  let body = json!({ "formationId": h.formation.formation_id, "buyerEmail": "buyer@example.com" });

  let res = send(&h.state, json_request("POST", "/checkout", &body)).await;
  assert_eq!(res.status(), StatusCode::CONFLICT);
  assert_eq!(body_json(res).await["code"], "PayoutNotConfigured");
  assert!(h.provider.intents.lock().unwrap().is_empty());
}

#[tokio::test]
async fn checkout_for_unknown_formation_is_not_found() {
  let h = harness(true).await;
  let body = json!({ "formationId": Uuid::new_v4(), "buyerEmail": "buyer@example.com" });

  let res = send(&h.state, json_request("POST", "/checkout", &body)).await;
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
  assert_eq!(body_json(res).await["code"], "FormationNotFound");
}

#[tokio::test]
async fn checkout_with_bad_email_is_invalid() {
  let h = harness(true).await;
  let body = json!({ "formationId": h.formation.formation_id, "buyerEmail": "nope" });

  let res = send(&h.state, json_request("POST", "/checkout", &body)).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(body_json(res).await["code"], "InvalidRequest");
}

#[tokio::test]
async fn checkout_with_malformed_body_is_invalid_json_error() {
  let h = harness(true).await;
  let body = json!({ "formationId": "nope", "buyerEmail": "buyer@example.com" });

  let res = send(&h.state, json_request("POST", "/checkout", &body)).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
  assert_eq!(body_json(res).await["code"], "InvalidRequest");

  let req = Request::builder()
    .method("POST")
    .uri("/checkout")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{not json"))
    .unwrap();
  let res = send(&h.state, req).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(body_json(res).await["code"], "InvalidRequest");
  assert_eq!(h.provider.intents.lock().unwrap().len(), 0);
}

// ─── Webhooks ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn forged_webhook_is_rejected_without_effects() {
  let h = harness(true).await;
  let event = checkout_completed(&h.formation, "cs_forged", "buyer@example.com");
  let forged = format!("t={},v1={}", Utc::now().timestamp(), "ab".repeat(32));

  let res = send(&h.state, webhook(&event, Some(&forged))).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  let json = body_json(res).await;
  assert_eq!(json["code"], "InvalidSignature");
  assert_eq!(json["message"], "invalid signature");

  assert_eq!(h.store.count_rows(Table::Purchases).await.unwrap(), 0);
  assert_eq!(h.store.count_rows(Table::Students).await.unwrap(), 0);
}

#[tokio::test]
async fn unsigned_webhook_is_rejected() {
  let h = harness(true).await;
  let event = checkout_completed(&h.formation, "cs_unsigned", "buyer@example.com");

  let res = send(&h.state, webhook(&event, None)).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(h.store.count_rows(Table::Purchases).await.unwrap(), 0);
}

#[tokio::test]
async fn stale_webhook_is_rejected() {
  let h = harness(true).await;
  let event = checkout_completed(&h.formation, "cs_stale", "buyer@example.com");
  let stale = provider_signature(event.to_string().as_bytes(), Utc::now().timestamp() - 3600);

  let res = send(&h.state, webhook(&event, Some(&stale))).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn redelivered_webhook_records_one_purchase() {
  let h = harness(true).await;
  let event = checkout_completed(&h.formation, "evt_123", "buyer@example.com");

  let first = send(&h.state, signed_webhook(&event)).await;
  assert_eq!(first.status(), StatusCode::OK);
  assert_eq!(body_json(first).await["status"], "fulfilled");

  let second = send(&h.state, signed_webhook(&event)).await;
  assert_eq!(second.status(), StatusCode::OK);
  assert_eq!(body_json(second).await["status"], "duplicate");

  assert_eq!(h.store.count_rows(Table::Purchases).await.unwrap(), 1);
  let purchase = h.store.get_purchase_by_reference("evt_123".into()).await.unwrap().unwrap();
  assert_eq!(purchase.amount, dec!(97.00));
}

#[tokio::test]
async fn unknown_event_is_acknowledged() {
  let h = harness(true).await;
  let event = json!({ "id": "evt_x", "type": "charge.refunded", "data": { "object": {} } });

  let res = send(&h.state, signed_webhook(&event)).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(body_json(res).await["status"], "ignored");
}

#[tokio::test]
async fn unknown_event_without_data_is_acknowledged() {
  let h = harness(true).await;
  let event = json!({ "id": "evt_ping", "type": "v2.core.event_destination.ping" });

  let res = send(&h.state, signed_webhook(&event)).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(body_json(res).await["status"], "ignored");
}

#[tokio::test]
async fn signed_but_unusable_event_is_invalid() {
  let h = harness(true).await;
  let event = json!({
    "type": "checkout.session.completed",
    "data": { "object": { "id": "cs_1", "customer_email": "buyer@example.com", "metadata": {} } }
  });

  let res = send(&h.state, signed_webhook(&event)).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(body_json(res).await["code"], "InvalidEvent");
}

#[tokio::test]
async fn account_update_enables_checkout() {
  let h = harness(false).await;
  let event = json!({
    "type": "account.updated",
    "data": { "object": { "id": "acct_router", "details_submitted": true, "charges_enabled": true } }
  });

  let res = send(&h.state, signed_webhook(&event)).await;
  assert_eq!(body_json(res).await["status"], "payout_onboarded");

  let body = json!({ "formationId": h.formation.formation_id, "buyerEmail": "buyer@example.com" });
  let res = send(&h.state, json_request("POST", "/checkout", &body)).await;
  assert_eq!(res.status(), StatusCode::OK);
}

// ─── Learner endpoints ───────────────────────────────────────────────────────

#[tokio::test]
async fn buyer_records_and_reads_progress() {
  let mut h = harness(true).await;
  let credential = buy(&mut h, "learner@example.com").await;
  let auth = basic("learner@example.com", &credential);

  let mut req = json_request(
    "POST",
    "/progress",
    &json!({ "lessonId": h.lessons[0].lesson_id, "completed": true }),
  );
  req.headers_mut().insert(header::AUTHORIZATION, auth.parse().unwrap());
  let res = send(&h.state, req).await;
  assert_eq!(res.status(), StatusCode::OK);
  let row = body_json(res).await;
  assert_eq!(row["completed"], true);
  assert!(row["completedAt"].is_string());

  let uri = format!("/progress?formationId={}", h.formation.formation_id);
  let req = Request::builder()
    .uri(&uri)
    .header(header::AUTHORIZATION, &auth)
    .body(Body::empty())
    .unwrap();
  let rows = body_json(send(&h.state, req).await).await;
  assert_eq!(rows.as_array().unwrap().len(), 1);

  let uri = format!("/progress/summary?formationId={}", h.formation.formation_id);
  let req = Request::builder()
    .uri(&uri)
    .header(header::AUTHORIZATION, &auth)
    .body(Body::empty())
    .unwrap();
  let summary = body_json(send(&h.state, req).await).await;
  assert_eq!(summary["completedLessons"], 1);
  assert_eq!(summary["totalLessons"], 2);
  assert_eq!(summary["percentComplete"], 50);

  let uri = format!("/formations/{}/content", h.formation.formation_id);
  let req = Request::builder()
    .uri(&uri)
    .header(header::AUTHORIZATION, &auth)
    .body(Body::empty())
    .unwrap();
  let res = send(&h.state, req).await;
  assert_eq!(res.status(), StatusCode::OK);
  let outline = body_json(res).await;
  assert_eq!(outline["modules"][0]["lessons"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn learner_endpoints_require_credentials() {
  let mut h = harness(true).await;
  buy(&mut h, "learner@example.com").await;

  let uri = format!("/progress?formationId={}", h.formation.formation_id);
  let res = send(&h.state, Request::builder().uri(&uri).body(Body::empty()).unwrap()).await;
  assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
  assert!(res.headers().contains_key(header::WWW_AUTHENTICATE));

  let req = Request::builder()
    .uri(&uri)
    .header(header::AUTHORIZATION, basic("learner@example.com", "wrong"))
    .body(Body::empty())
    .unwrap();
  assert_eq!(send(&h.state, req).await.status(), StatusCode::UNAUTHORIZED);

  let req = Request::builder()
    .uri(&uri)
    .header(header::AUTHORIZATION, basic("ghost@example.com", "whatever"))
    .body(Body::empty())
    .unwrap();
  assert_eq!(send(&h.state, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_buyer_is_forbidden() {
  let h = harness(true).await;
  h.store
    .upsert_student(NewStudent {
      email:           "browser@example.com".into(),
      display_name:    "browser".into(),
      credential_hash: hash_credential("letmein").unwrap(),
    })
    .await
    .unwrap();
  let auth = basic("browser@example.com", "letmein");

  let uri = format!("/formations/{}/content", h.formation.formation_id);
  let req = Request::builder()
    .uri(&uri)
    .header(header::AUTHORIZATION, &auth)
    .body(Body::empty())
    .unwrap();
  let res = send(&h.state, req).await;
  assert_eq!(res.status(), StatusCode::FORBIDDEN);
  assert_eq!(body_json(res).await["code"], "Forbidden");

  let mut req = json_request(
    "POST",
    "/progress",
    &json!({ "lessonId": h.lessons[0].lesson_id, "completed": true }),
  );
  req.headers_mut().insert(header::AUTHORIZATION, auth.parse().unwrap());
  assert_eq!(send(&h.state, req).await.status(), StatusCode::FORBIDDEN);

  let mut req = json_request(
    "POST",
    "/progress",
    &json!({ "lessonId": Uuid::new_v4(), "completed": true }),
  );
  req.headers_mut().insert(header::AUTHORIZATION, auth.parse().unwrap());
  assert_eq!(send(&h.state, req).await.status(), StatusCode::FORBIDDEN);

  assert_eq!(h.store.count_rows(Table::Progress).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_learner_parameters_are_invalid_request() {
  let mut h = harness(true).await;
  let credential = buy(&mut h, "learner@example.com").await;
  let auth = basic("learner@example.com", &credential);

  let req = Request::builder()
    .uri("/progress?formationId=nope")
    .header(header::AUTHORIZATION, &auth)
    .body(Body::empty())
    .unwrap();
  let res = send(&h.state, req).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(body_json(res).await["code"], "InvalidRequest");

  let req = Request::builder()
    .uri("/formations/not-a-uuid/content")
    .header(header::AUTHORIZATION, &auth)
    .body(Body::empty())
    .unwrap();
  let res = send(&h.state, req).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
  assert_eq!(body_json(res).await["code"], "InvalidRequest");
}

//! Handlers for `/progress` endpoints, scoped to the authenticated buyer.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/progress` | Body: `{"lessonId":"...","completed":true}` |
//! | `GET`  | `/progress` | `?formationId=...` |
//! | `GET`  | `/progress/summary` | `?formationId=...` |

use axum::{Json, extract::State};
use formation_core::{
  progress::{self, CompletionSummary, Progress},
  store::LedgerStore,
};
use formation_payments::PaymentProvider;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  auth::AuthenticatedBuyer,
  error::ApiError,
  extract::{ApiJson, ApiQuery},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
  pub lesson_id: Uuid,
  pub completed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationParams {
  pub formation_id: Uuid,
}

// ─── Record ───────────────────────────────────────────────────────────────────

/// `POST /progress`
pub async fn record<S, P>(
  State(state): State<AppState<S, P>>,
  buyer: AuthenticatedBuyer,
  ApiJson(body): ApiJson<RecordBody>,
) -> Result<Json<Progress>, ApiError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let row = progress::mark_lesson_progress(
    state.store.as_ref(),
    buyer.student_id,
    body.lesson_id,
    body.completed,
  )
  .await?;
  Ok(Json(row))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /progress?formationId=<id>`
pub async fn list<S, P>(
  State(state): State<AppState<S, P>>,
  buyer: AuthenticatedBuyer,
  ApiQuery(params): ApiQuery<FormationParams>,
) -> Result<Json<Vec<Progress>>, ApiError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let rows =
    progress::formation_progress(state.store.as_ref(), buyer.student_id, params.formation_id)
      .await?;
  Ok(Json(rows))
}

// ─── Summary ──────────────────────────────────────────────────────────────────

/// `GET /progress/summary?formationId=<id>`
pub async fn summary<S, P>(
  State(state): State<AppState<S, P>>,
  buyer: AuthenticatedBuyer,
  ApiQuery(params): ApiQuery<FormationParams>,
) -> Result<Json<CompletionSummary>, ApiError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let summary =
    progress::completion_summary(state.store.as_ref(), buyer.student_id, params.formation_id)
      .await?;
  Ok(Json(summary))
}

//! `GET /formations/{id}/content`: the outline of a bought formation.

use axum::{Json, extract::State};
use formation_core::{access::formation_content, catalog::FormationOutline, store::LedgerStore};
use formation_payments::PaymentProvider;
use uuid::Uuid;

use crate::{AppState, auth::AuthenticatedBuyer, error::ApiError, extract::ApiPath};

pub async fn outline<S, P>(
  State(state): State<AppState<S, P>>,
  buyer: AuthenticatedBuyer,
  ApiPath(formation_id): ApiPath<Uuid>,
) -> Result<Json<FormationOutline>, ApiError>
where
  S: LedgerStore,
  P: PaymentProvider,
{
  let outline = formation_content(state.store.as_ref(), buyer.student_id, formation_id).await?;
  Ok(Json(outline))
}

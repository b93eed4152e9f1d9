//! Handlers for `/merges` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/merges` | Body: [`MergeBody`]; returns 201 + the [`MergeOperation`] |
//! | `GET`  | `/merges` | Newest first; optional `?patient_id`, `limit`, `offset` |
//! | `GET`  | `/merges/:id` | 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use unify_core::{
  candidate::ConfidenceScore,
  engine::Engine,
  merge::{HistoryQuery, MergeHistoryEntry, MergeRequest},
  store::IdentityStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /merges`.
#[derive(Debug, Deserialize)]
pub struct MergeBody {
  pub source_id:        Uuid,
  pub target_id:        Uuid,
  pub reason:           String,
  /// Must lie in `[0, 1]`.
  pub confidence_score: f64,
  pub performed_by:     String,
}

impl TryFrom<MergeBody> for MergeRequest {
  type Error = unify_core::Error;

  fn try_from(b: MergeBody) -> Result<Self, Self::Error> {
    Ok(MergeRequest {
      source_id:        b.source_id,
      target_id:        b.target_id,
      reason:           b.reason,
      confidence_score: ConfidenceScore::new(b.confidence_score)?,
      performed_by:     b.performed_by,
    })
  }
}

/// `POST /merges`: returns 201 + the committed
/// [`MergeOperation`](unify_core::merge::MergeOperation).
pub async fn create<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  body: Result<Json<MergeBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
  let Json(body) = body?;
  let op = engine.request_merge(MergeRequest::try_from(body)?).await?;
  Ok((StatusCode::CREATED, Json(op)))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /merges[?patient_id=<id>][&limit=n][&offset=n]`
pub async fn list<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  params: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<MergeHistoryEntry>>, ApiError> {
  let Query(query) = params?;
  Ok(Json(engine.merge_history(&query).await?))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /merges/:id`
pub async fn get_one<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<MergeHistoryEntry>, ApiError> {
  Ok(Json(engine.get_merge(id).await?))
}

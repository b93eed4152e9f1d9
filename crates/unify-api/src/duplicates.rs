//! Handlers for `/duplicates` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/duplicates/scan` | Body: [`DetectionScope`]; `{}` scans every tenant |
//! | `GET`  | `/duplicates` | Stored candidates; optional `?tenant_id` |
//! | `POST` | `/duplicates/dismiss` | Body: [`DismissBody`]; returns 204 |

use std::sync::Arc;

use axum::{
  Json,
  extract::{
    Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
};
use serde::Deserialize;
use unify_core::{
  candidate::{DetectionScope, DuplicateCandidate},
  engine::Engine,
  store::IdentityStore,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Scan ─────────────────────────────────────────────────────────────────────

/// `POST /duplicates/scan`: rescans and returns the refreshed candidates.
pub async fn scan<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  body: Result<Json<DetectionScope>, JsonRejection>,
) -> Result<Json<Vec<DuplicateCandidate>>, ApiError> {
  let Json(scope) = body?;
  Ok(Json(engine.detect_duplicates(&scope).await?))
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub tenant_id: Option<String>,
}

/// `GET /duplicates[?tenant_id=<tenant>]`
pub async fn list<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<DuplicateCandidate>>, ApiError> {
  let Query(params) = params?;
  let scope = DetectionScope {
    tenant_id:   params.tenant_id,
    patient_ids: Vec::new(),
  };
  Ok(Json(engine.list_candidates(&scope).await?))
}

// ─── Dismiss ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DismissBody {
  pub patient_a:    Uuid,
  pub patient_b:    Uuid,
  pub dismissed_by: String,
  pub reason:       Option<String>,
}

/// `POST /duplicates/dismiss`: marks the pair as not a duplicate.
pub async fn dismiss<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  body: Result<Json<DismissBody>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
  let Json(body) = body?;
  engine
    .dismiss_candidate(body.patient_a, body.patient_b, body.dismissed_by, body.reason)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}

//! Read-only handlers for `/patients` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/patients` | Optional `?tenant_id`, `include_merged` |
//! | `GET`  | `/patients/:id` | `?resolve=true` follows `merged_into` to the survivor |
//! | `GET`  | `/patients/:id/artifacts` | Artifact counts per kind |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State, rejection::QueryRejection},
};
use serde::Deserialize;
use unify_core::{
  artifact::ArtifactCounts,
  engine::Engine,
  patient::{PatientQuery, PatientRecord},
  store::IdentityStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /patients[?tenant_id=<tenant>][&include_merged=true]`
pub async fn list<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  params: Result<Query<PatientQuery>, QueryRejection>,
) -> Result<Json<Vec<PatientRecord>>, ApiError> {
  let Query(query) = params?;
  Ok(Json(engine.list_patients(&query).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
  #[serde(default)]
  pub resolve: bool,
}

/// `GET /patients/:id[?resolve=true]`
pub async fn get_one<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
  params: Result<Query<GetParams>, QueryRejection>,
) -> Result<Json<PatientRecord>, ApiError> {
  let Query(params) = params?;
  let patient = if params.resolve {
    engine.resolve_patient(id).await?
  } else {
    engine.get_patient(id).await?
  };
  Ok(Json(patient))
}

/// `GET /patients/:id/artifacts`
pub async fn artifacts<S: IdentityStore>(
  State(engine): State<Arc<Engine<S>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ArtifactCounts>, ApiError> {
  Ok(Json(engine.count_artifacts(id).await?))
}

//! JSON REST API for Unify.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`unify_core::store::IdentityStore`]. Auth, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", unify_api::api_router(engine.clone()))
//! ```

pub mod duplicates;
pub mod error;
pub mod merges;
pub mod patients;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use unify_core::{engine::Engine, store::IdentityStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Arc<Engine<S>>) -> Router<()>
where
  S: IdentityStore + 'static,
{
  Router::new()
    // Duplicate candidates
    .route("/duplicates", get(duplicates::list::<S>))
    .route("/duplicates/scan", post(duplicates::scan::<S>))
    .route("/duplicates/dismiss", post(duplicates::dismiss::<S>))
    // Merges
    .route("/merges", get(merges::list::<S>).post(merges::create::<S>))
    .route("/merges/{id}", get(merges::get_one::<S>))
    // Patients
    .route("/patients", get(patients::list::<S>))
    .route("/patients/{id}", get(patients::get_one::<S>))
    .route("/patients/{id}/artifacts", get(patients::artifacts::<S>))
    .with_state(engine)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use unify_core::{
    artifact::{ArtifactKind, NewArtifact},
    matching::MatchingConfig,
    patient::{NewPatient, PatientRecord},
  };
  use unify_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  async fn make_engine() -> Arc<Engine<SqliteStore>> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Arc::new(Engine::new(Arc::new(store), &MatchingConfig::default()))
  }

  async fn add(engine: &Engine<SqliteStore>, name: &str, cpf: &str) -> PatientRecord {
    engine
      .store()
      .add_patient(NewPatient {
        national_id: Some(cpf.to_string()),
        ..NewPatient::new("clinic-1", name)
      })
      .await
      .unwrap()
  }

  async fn send(
    engine: &Arc<Engine<SqliteStore>>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(engine.clone())
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();

    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
      .await
      .unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  fn merge_body(source: Uuid, target: Uuid) -> Value {
    json!({
      "source_id":        source,
      "target_id":        target,
      "reason":           "same CPF",
      "confidence_score": 1.0,
      "performed_by":     "operator-1",
    })
  }

  // ── Duplicates ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn scan_returns_candidates() {
    let engine = make_engine().await;
    add(&engine, "Maria Silva", "111").await;
    add(&engine, "Maria Silva", "111").await;

    let (status, body) =
      send(&engine, "POST", "/duplicates/scan", Some(json!({ "tenant_id": "clinic-1" }))).await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["match_type"], "CPF_EXACT");
    assert_eq!(list[0]["confidence_score"], 1.0);

    let (status, body) = send(&engine, "GET", "/duplicates?tenant_id=clinic-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn dismiss_returns_204_and_hides_pair() {
    let engine = make_engine().await;
    let a = add(&engine, "Maria Silva", "111").await;
    let b = add(&engine, "Maria Silva", "111").await;
    send(&engine, "POST", "/duplicates/scan", Some(json!({}))).await;

    let (status, _) = send(
      &engine,
      "POST",
      "/duplicates/dismiss",
      Some(json!({
        "patient_a":    a.patient_id,
        "patient_b":    b.patient_id,
        "dismissed_by": "operator-1",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = send(&engine, "GET", "/duplicates", None).await;
    assert!(body.as_array().unwrap().is_empty());
  }

  // ── Merges ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn merge_returns_201_with_moved_counts() {
    let engine = make_engine().await;
    let a = add(&engine, "Maria Silva", "111").await;
    let b = add(&engine, "Maria Silva", "111").await;
    for i in 0..3 {
      engine
        .store()
        .add_artifact(NewArtifact::new(ArtifactKind::Documents, a.patient_id, format!("doc {i}")))
        .await
        .unwrap();
    }

    let (status, body) =
      send(&engine, "POST", "/merges", Some(merge_body(a.patient_id, b.patient_id))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data_moved"]["documents"], 3);
    assert_eq!(body["data_moved"]["appointments"], 0);

    let merge_id = body["merge_id"].as_str().unwrap().to_string();
    let (status, body) = send(&engine, "GET", &format!("/merges/{merge_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source_name"], "Maria Silva");

    let (_, body) = send(&engine, "GET", "/merges", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = send(&engine, "GET", &format!("/patients/{}/artifacts", b.patient_id), None).await;
    assert_eq!(body["documents"], 3);
  }

  #[tokio::test]
  async fn repeated_merge_is_409_already_merged() {
    let engine = make_engine().await;
    let a = add(&engine, "Ana", "111").await;
    let b = add(&engine, "Ana", "111").await;
    send(&engine, "POST", "/merges", Some(merge_body(a.patient_id, b.patient_id))).await;

    let (status, body) =
      send(&engine, "POST", "/merges", Some(merge_body(a.patient_id, b.patient_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["kind"], "AlreadyMerged");
    assert_eq!(body["error"]["retryable"], false);
  }

  #[tokio::test]
  async fn self_merge_is_400() {
    let engine = make_engine().await;
    let a = add(&engine, "Ana", "111").await;

    let (status, body) =
      send(&engine, "POST", "/merges", Some(merge_body(a.patient_id, a.patient_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidRequest");
  }

  #[tokio::test]
  async fn out_of_range_confidence_is_400() {
    let engine = make_engine().await;
    let a = add(&engine, "Ana", "111").await;
    let b = add(&engine, "Ana", "111").await;
    let mut body = merge_body(a.patient_id, b.patient_id);
    body["confidence_score"] = json!(1.5);

    let (status, body) = send(&engine, "POST", "/merges", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidRequest");
  }

  #[tokio::test]
  async fn malformed_body_uses_error_envelope() {
    let engine = make_engine().await;
    let (status, body) = send(&engine, "POST", "/merges", Some(json!({ "reason": 7 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidRequest");
  }

  #[tokio::test]
  async fn unknown_merge_is_404() {
    let engine = make_engine().await;
    let (status, body) = send(&engine, "GET", &format!("/merges/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "NotFound");
  }

  // ── Patients ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn resolve_follows_merge() {
    let engine = make_engine().await;
    let a = add(&engine, "Ana", "111").await;
    let b = add(&engine, "Ana", "111").await;
    send(&engine, "POST", "/merges", Some(merge_body(a.patient_id, b.patient_id))).await;

    let (_, body) = send(&engine, "GET", &format!("/patients/{}", a.patient_id), None).await;
    assert_eq!(body["status"], "merged");

    let (_, body) =
      send(&engine, "GET", &format!("/patients/{}?resolve=true", a.patient_id), None).await;
    assert_eq!(body["patient_id"], b.patient_id.to_string());
    assert_eq!(body["status"], "active");

    let (_, body) = send(&engine, "GET", "/patients", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (_, body) = send(&engine, "GET", "/patients?include_merged=true", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
  }
}

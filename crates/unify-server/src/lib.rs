//! HTTP server wiring for Unify.
//!
//! Mounts the REST API under `/api`, adds a liveness probe and request
//! tracing, and optionally runs duplicate detection on a fixed interval.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use unify_core::{
  candidate::DetectionScope, engine::Engine, matching::MatchingConfig, store::IdentityStore,
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `unify.toml` and `UNIFY_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// How long a merge waits for another writer before failing with a
  /// retryable conflict.
  pub busy_timeout_ms:    u64,
  /// Rescan every tenant this often. Unset disables background detection.
  pub scan_interval_secs: Option<u64>,
  pub matching:           MatchingConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:               "127.0.0.1".to_string(),
      port:               8750,
      store_path:         PathBuf::from("~/.local/share/unify/unify.db"),
      busy_timeout_ms:    5_000,
      scan_interval_secs: None,
      matching:           MatchingConfig::default(),
    }
  }
}

impl ServerConfig {
  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }

  pub fn scan_interval(&self) -> Option<Duration> {
    self
      .scan_interval_secs
      .filter(|&s| s > 0)
      .map(Duration::from_secs)
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router for `engine`.
pub fn router<S>(engine: Arc<Engine<S>>) -> Router
where
  S: IdentityStore + 'static,
{
  Router::new()
    .nest("/api", unify_api::api_router(engine))
    .route("/healthz", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
}

// ─── Background detection ────────────────────────────────────────────────────

/// Rescan every tenant each `interval`. A failed scan is logged and the
/// previously stored candidates are kept.
pub fn spawn_scanner<S>(engine: Arc<Engine<S>>, interval: Duration) -> JoinHandle<()>
where
  S: IdentityStore + 'static,
{
  info!(interval_secs = interval.as_secs_f64(), "background duplicate scan enabled");
  tokio::spawn(async move {
    let scope = DetectionScope::default();
    loop {
      tokio::time::sleep(interval).await;
      if let Err(e) = engine.detect_duplicates(&scope).await {
        error!(error = %e, "background duplicate scan failed");
      }
    }
  })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use tower::ServiceExt as _;
  use unify_core::patient::NewPatient;
  use unify_store_sqlite::SqliteStore;

  use super::*;

  async fn make_engine() -> Arc<Engine<SqliteStore>> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Arc::new(Engine::new(Arc::new(store), &MatchingConfig::default()))
  }

  #[tokio::test]
  async fn healthz_is_ok() {
    let engine = make_engine().await;
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let resp = router(engine).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn api_is_nested() {
    let engine = make_engine().await;
    let req = Request::builder().uri("/api/merges").body(Body::empty()).unwrap();
    let resp = router(engine).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[test]
  fn zero_interval_disables_scanning() {
    let cfg = ServerConfig { scan_interval_secs: Some(0), ..ServerConfig::default() };
    assert_eq!(cfg.scan_interval(), None);

    let cfg = ServerConfig { scan_interval_secs: Some(30), ..ServerConfig::default() };
    assert_eq!(cfg.scan_interval(), Some(Duration::from_secs(30)));
  }

  #[tokio::test]
  async fn scanner_refreshes_candidates() {
    let engine = make_engine().await;
    for _ in 0..2 {
      engine
        .store()
        .add_patient(NewPatient {
          national_id: Some("111".into()),
          ..NewPatient::new("clinic-1", "Maria Silva")
        })
        .await
        .unwrap();
    }

    let handle = spawn_scanner(engine.clone(), Duration::from_millis(10));
    let mut found = Vec::new();
    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      found = engine.list_candidates(&DetectionScope::default()).await.unwrap();
      if !found.is_empty() {
        break;
      }
    }
    handle.abort();
    assert_eq!(found.len(), 1);
  }
}

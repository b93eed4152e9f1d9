//! Async HTTP client wrapping the Unify JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::{Value, json};
use unify_core::{
  artifact::ArtifactCounts,
  candidate::DuplicateCandidate,
  merge::{MergeHistoryEntry, MergeOperation},
  patient::PatientRecord,
};
use uuid::Uuid;

/// Connection settings for the Unify API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Recorded as `performed_by` / `dismissed_by`.
  pub operator: String,
  /// Restrict the review queue to one tenant.
  pub tenant:   Option<String>,
}

/// Body of `POST /api/merges`.
#[derive(Debug, Serialize)]
pub struct MergeBody<'a> {
  pub source_id:        Uuid,
  pub target_id:        Uuid,
  pub reason:           &'a str,
  pub confidence_score: f64,
  pub performed_by:     &'a str,
}

/// Async HTTP client for the Unify JSON REST API.
///
/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  pub fn config(&self) -> &ApiConfig { &self.config }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn tenant_query(&self) -> Vec<(&'static str, String)> {
    self
      .config
      .tenant
      .iter()
      .map(|t| ("tenant_id", t.clone()))
      .collect()
  }

  // ── Duplicates ────────────────────────────────────────────────────────────

  /// `GET /api/duplicates[?tenant_id=<t>]`
  pub async fn list_candidates(&self) -> Result<Vec<DuplicateCandidate>> {
    let resp = self
      .client
      .get(self.url("/duplicates"))
      .query(&self.tenant_query())
      .send()
      .await
      .context("GET /duplicates failed")?;
    let resp = check(resp, "GET /duplicates").await?;
    resp.json().await.context("deserialising candidates")
  }

  /// `POST /api/duplicates/scan`
  pub async fn scan(&self) -> Result<Vec<DuplicateCandidate>> {
    let resp = self
      .client
      .post(self.url("/duplicates/scan"))
      .json(&json!({ "tenant_id": self.config.tenant }))
      .send()
      .await
      .context("POST /duplicates/scan failed")?;
    let resp = check(resp, "POST /duplicates/scan").await?;
    resp.json().await.context("deserialising candidates")
  }

  /// `POST /api/duplicates/dismiss`
  pub async fn dismiss(&self, a: Uuid, b: Uuid, reason: &str) -> Result<()> {
    let resp = self
      .client
      .post(self.url("/duplicates/dismiss"))
      .json(&json!({
        "patient_a":    a,
        "patient_b":    b,
        "dismissed_by": self.config.operator,
        "reason":       reason,
      }))
      .send()
      .await
      .context("POST /duplicates/dismiss failed")?;
    check(resp, "POST /duplicates/dismiss").await?;
    Ok(())
  }

  // ── Patients ──────────────────────────────────────────────────────────────

  /// `GET /api/patients/<id>`
  pub async fn get_patient(&self, id: Uuid) -> Result<PatientRecord> {
    let path = format!("/patients/{id}");
    let resp = self
      .client
      .get(self.url(&path))
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    let resp = check(resp, &format!("GET {path}")).await?;
    resp.json().await.context("deserialising patient")
  }

  /// `GET /api/patients/<id>/artifacts`
  pub async fn count_artifacts(&self, id: Uuid) -> Result<ArtifactCounts> {
    let path = format!("/patients/{id}/artifacts");
    let resp = self
      .client
      .get(self.url(&path))
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    let resp = check(resp, &format!("GET {path}")).await?;
    resp.json().await.context("deserialising artifact counts")
  }

  // ── Merges ────────────────────────────────────────────────────────────────

  /// `POST /api/merges`
  pub async fn merge(&self, body: &MergeBody<'_>) -> Result<MergeOperation> {
    let resp = self
      .client
      .post(self.url("/merges"))
      .json(body)
      .send()
      .await
      .context("POST /merges failed")?;
    let resp = check(resp, "POST /merges").await?;
    resp.json().await.context("deserialising merge operation")
  }

  /// `GET /api/merges?limit=<n>`
  pub async fn history(&self, limit: usize) -> Result<Vec<MergeHistoryEntry>> {
    let resp = self
      .client
      .get(self.url("/merges"))
      .query(&[("limit", limit)])
      .send()
      .await
      .context("GET /merges failed")?;
    let resp = check(resp, "GET /merges").await?;
    resp.json().await.context("deserialising merge history")
  }
}

/// Pass successful responses through; turn error envelopes into a readable
/// message.
async fn check(resp: Response, what: &str) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body: Value = resp.json().await.unwrap_or(Value::Null);
  Err(anyhow!("{what} → {status}: {}", error_message(&body)))
}

fn error_message(body: &Value) -> String {
  let err = &body["error"];
  match (err["kind"].as_str(), err["message"].as_str()) {
    (Some(kind), Some(message)) => format!("{kind}: {message}"),
    _ => "no error details".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_message_reads_envelope() {
    let body = json!({
      "error": { "kind": "AlreadyMerged", "message": "patient already merged", "retryable": false }
    });
    assert_eq!(error_message(&body), "AlreadyMerged: patient already merged");
    assert_eq!(error_message(&Value::Null), "no error details");
  }
}

//! [`Engine`]: the stateless deduplication service.
//!
//! Holds no state besides the store handle and the configured detector, so a
//! single instance can be shared across request handlers and background jobs.

use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  artifact::ArtifactCounts,
  candidate::{CandidateDismissal, DetectionScope, DuplicateCandidate, PatientPair},
  matching::{Detector, MatchingConfig},
  merge::{HistoryQuery, MergeHistoryEntry, MergeOperation, MergeRequest},
  patient::{PatientQuery, PatientRecord},
  store::IdentityStore,
};

pub struct Engine<S> {
  store:    Arc<S>,
  detector: Detector,
}

impl<S: IdentityStore> Engine<S> {
  pub fn new(store: Arc<S>, config: &MatchingConfig) -> Self {
    Self::with_detector(store, Detector::from_config(config))
  }

  pub fn with_detector(store: Arc<S>, detector: Detector) -> Self {
    Self { store, detector }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Detection ─────────────────────────────────────────────────────────

  /// Scan the repository and replace the stored candidates for `scope`.
  ///
  /// If the scan cannot read the repository, the previously stored
  /// candidates are left untouched.
  pub async fn detect_duplicates(
    &self,
    scope: &DetectionScope,
  ) -> Result<Vec<DuplicateCandidate>> {
    let query = PatientQuery {
      tenant_id:      scope.tenant_id.clone(),
      include_merged: false,
    };
    let patients = self.store.list_patients(&query).await.map_err(Into::into)?;

    let matches = self.detector.scan(&patients, scope);
    debug!(
      patients = patients.len(),
      matches = matches.len(),
      tenant = scope.tenant_id.as_deref().unwrap_or("*"),
      "duplicate scan finished"
    );

    let candidates = self
      .store
      .replace_candidates(scope, matches, Utc::now())
      .await
      .map_err(Into::into)?;
    info!(candidates = candidates.len(), "duplicate candidates refreshed");
    Ok(candidates)
  }

  pub async fn list_candidates(
    &self,
    scope: &DetectionScope,
  ) -> Result<Vec<DuplicateCandidate>> {
    self.store.list_candidates(scope).await.map_err(Into::into)
  }

  pub async fn dismiss_candidate(
    &self,
    a: Uuid,
    b: Uuid,
    dismissed_by: String,
    reason: Option<String>,
  ) -> Result<()> {
    let pair = PatientPair::new(a, b)
      .ok_or_else(|| Error::InvalidRequest("a pair needs two distinct patients".into()))?;
    if dismissed_by.trim().is_empty() {
      return Err(Error::InvalidRequest("dismissed_by must not be blank".into()));
    }
    self.get_patient(a).await?;
    self.get_patient(b).await?;

    self
      .store
      .dismiss_candidate(CandidateDismissal {
        pair,
        dismissed_by,
        reason,
        dismissed_at: Utc::now(),
      })
      .await
      .map_err(Into::into)?;
    info!(patient_a = %pair.patient_a, patient_b = %pair.patient_b, "candidate dismissed");
    Ok(())
  }

  // ── Merge ─────────────────────────────────────────────────────────────

  /// Retire `request.source_id` into `request.target_id`. Every attempt is
  /// logged; only a successful one leaves an audit row.
  pub async fn request_merge(&self, request: MergeRequest) -> Result<MergeOperation> {
    let source = request.source_id;
    let target = request.target_id;
    info!(
      %source,
      %target,
      performed_by = %request.performed_by,
      confidence = request.confidence_score.value(),
      "merge requested"
    );

    match self.store.merge(request).await.map_err(Into::into) {
      Ok(op) => {
        info!(
          merge_id = %op.merge_id,
          %source,
          %target,
          rows_moved = op.data_moved.total(),
          fields_backfilled = op.fields_backfilled.len(),
          "merge committed"
        );
        Ok(op)
      }
      Err(e) if e.is_retryable() => {
        error!(%source, %target, error = %e, "merge rolled back");
        Err(e)
      }
      Err(e @ Error::Storage(_)) => {
        error!(%source, %target, error = %e, "merge failed");
        Err(e)
      }
      Err(e) => {
        warn!(%source, %target, error = %e, "merge rejected");
        Err(e)
      }
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn merge_history(&self, query: &HistoryQuery) -> Result<Vec<MergeHistoryEntry>> {
    self.store.merge_history(query).await.map_err(Into::into)
  }

  pub async fn get_merge(&self, merge_id: Uuid) -> Result<MergeHistoryEntry> {
    self
      .store
      .get_merge(merge_id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::NotFound(merge_id))
  }

  pub async fn list_patients(&self, query: &PatientQuery) -> Result<Vec<PatientRecord>> {
    self.store.list_patients(query).await.map_err(Into::into)
  }

  pub async fn get_patient(&self, id: Uuid) -> Result<PatientRecord> {
    self
      .store
      .get_patient(id)
      .await
      .map_err(Into::into)?
      .ok_or(Error::NotFound(id))
  }

  /// Follow `merged_into` links from `id` to the surviving active record.
  pub async fn resolve_patient(&self, id: Uuid) -> Result<PatientRecord> {
    let mut seen = HashSet::new();
    let mut current = self.get_patient(id).await?;

    while let Some(next) = current.merged_into {
      if !seen.insert(current.patient_id) {
        return Err(Error::Conflict(format!("merge chain from {id} loops")));
      }
      current = self.get_patient(next).await?;
    }
    Ok(current)
  }

  pub async fn count_artifacts(&self, patient_id: Uuid) -> Result<ArtifactCounts> {
    // Distinguish "no artifacts" from "no such patient".
    self.get_patient(patient_id).await?;
    self.store.count_artifacts(patient_id).await.map_err(Into::into)
  }
}

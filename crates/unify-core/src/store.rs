//! The `IdentityStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `unify-store-sqlite`).
//! The [`Engine`](crate::engine::Engine) and the HTTP layer depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  artifact::{Artifact, ArtifactCounts, ArtifactKind, NewArtifact},
  candidate::{CandidateDismissal, CandidateMatch, DetectionScope, DuplicateCandidate},
  merge::{HistoryQuery, MergeHistoryEntry, MergeOperation, MergeRequest},
  patient::{NewPatient, PatientQuery, PatientRecord, PatientUpdate},
};

/// Abstraction over a patient-identity backend.
///
/// Backend errors must convert into [`crate::Error`] so callers can classify
/// them (validation, conflict, transient failure).
pub trait IdentityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Patients (intake boundary) ────────────────────────────────────────

  /// Persist a new active patient record. Used by intake adapters and
  /// tests; the engine never creates patients.
  fn add_patient(
    &self,
    input: NewPatient,
  ) -> impl Future<Output = Result<PatientRecord, Self::Error>> + Send + '_;

  /// Retrieve a patient by UUID. Returns `None` if not found.
  fn get_patient(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<PatientRecord>, Self::Error>> + Send + '_;

  fn list_patients<'a>(
    &'a self,
    query: &'a PatientQuery,
  ) -> impl Future<Output = Result<Vec<PatientRecord>, Self::Error>> + Send + 'a;

  /// Apply a profile edit. Fails with `AlreadyMerged` on a retired record.
  fn update_patient(
    &self,
    id: Uuid,
    update: PatientUpdate,
  ) -> impl Future<Output = Result<PatientRecord, Self::Error>> + Send + '_;

  // ── Artifacts (intake boundary) ───────────────────────────────────────

  fn add_artifact(
    &self,
    input: NewArtifact,
  ) -> impl Future<Output = Result<Artifact, Self::Error>> + Send + '_;

  fn list_artifacts(
    &self,
    patient_id: Uuid,
    kind: Option<ArtifactKind>,
  ) -> impl Future<Output = Result<Vec<Artifact>, Self::Error>> + Send + '_;

  /// Number of artifacts of each kind owned by `patient_id`.
  fn count_artifacts(
    &self,
    patient_id: Uuid,
  ) -> impl Future<Output = Result<ArtifactCounts, Self::Error>> + Send + '_;

  // ── Candidates ────────────────────────────────────────────────────────

  /// Atomically replace the stored candidate rows covered by `scope` with
  /// `matches`. Rows for a `(pair, match_type)` that is still present keep
  /// their original `detected_at`; dismissed pairs are skipped. Returns the
  /// stored candidates for `scope`, ranked.
  fn replace_candidates<'a>(
    &'a self,
    scope: &'a DetectionScope,
    matches: Vec<CandidateMatch>,
    detected_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DuplicateCandidate>, Self::Error>> + Send + 'a;

  /// Stored candidates for `scope`, ranked, without rescanning.
  fn list_candidates<'a>(
    &'a self,
    scope: &'a DetectionScope,
  ) -> impl Future<Output = Result<Vec<DuplicateCandidate>, Self::Error>> + Send + 'a;

  /// Record that a pair is not a duplicate and drop its stored rows.
  fn dismiss_candidate(
    &self,
    dismissal: CandidateDismissal,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Merge ─────────────────────────────────────────────────────────────

  /// Carry out `request` in a single transaction: validate, reassign every
  /// artifact kind in [`ArtifactKind::MERGE_ORDER`], backfill the target,
  /// retire the source, clear the source's candidates and record the
  /// [`MergeOperation`]. Either all of it is committed or none of it is.
  fn merge(
    &self,
    request: MergeRequest,
  ) -> impl Future<Output = Result<MergeOperation, Self::Error>> + Send + '_;

  // ── Audit reads ───────────────────────────────────────────────────────

  /// Completed merges, most recent first.
  fn merge_history<'a>(
    &'a self,
    query: &'a HistoryQuery,
  ) -> impl Future<Output = Result<Vec<MergeHistoryEntry>, Self::Error>> + Send + 'a;

  fn get_merge(
    &self,
    merge_id: Uuid,
  ) -> impl Future<Output = Result<Option<MergeHistoryEntry>, Self::Error>> + Send + '_;
}

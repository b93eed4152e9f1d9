//! Merge requests, the audit record they produce, and the precondition checks
//! every backend runs before mutating anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  artifact::ArtifactCounts,
  candidate::ConfidenceScore,
  patient::PatientRecord,
};

// ─── Request ─────────────────────────────────────────────────────────────────

/// Retire `source_id` into `target_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
  pub source_id:        Uuid,
  pub target_id:        Uuid,
  pub reason:           String,
  pub confidence_score: ConfidenceScore,
  /// Operator or automated policy that asked for the merge.
  pub performed_by:     String,
}

// ─── Audit record ────────────────────────────────────────────────────────────

/// The permanent record of one completed merge. Written exactly once, inside
/// the merge transaction, and never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeOperation {
  pub merge_id:          Uuid,
  pub source_patient_id: Uuid,
  pub target_patient_id: Uuid,
  pub merge_reason:      String,
  pub confidence_score:  ConfidenceScore,
  pub performed_at:      DateTime<Utc>,
  pub performed_by:      String,
  /// Rows reassigned per artifact kind.
  pub data_moved:        ArtifactCounts,
  /// Target fields that were empty and were filled from the source.
  pub fields_backfilled: Vec<String>,
}

/// A history row with display names for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeHistoryEntry {
  #[serde(flatten)]
  pub operation:   MergeOperation,
  pub source_name: String,
  pub target_name: String,
}

/// Parameters for [`crate::store::IdentityStore::merge_history`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
  /// Only merges where this patient was the source or the target.
  pub patient_id: Option<Uuid>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}

// ─── Preconditions ───────────────────────────────────────────────────────────

/// Check that the request can be carried out against the records as they are
/// now. Backends call this inside the merge transaction, before the first
/// write, with the records they just read.
///
/// A target that has itself been merged is rejected rather than followed to
/// its surviving record.
pub fn validate_merge(
  request: &MergeRequest,
  source: Option<&PatientRecord>,
  target: Option<&PatientRecord>,
) -> Result<()> {
  if request.source_id == request.target_id {
    return Err(Error::InvalidRequest(format!(
      "cannot merge patient {} into itself",
      request.source_id
    )));
  }
  if request.performed_by.trim().is_empty() {
    return Err(Error::InvalidRequest("performed_by must not be blank".into()));
  }
  if request.reason.trim().is_empty() {
    return Err(Error::InvalidRequest("merge reason must not be blank".into()));
  }

  let source = source.ok_or(Error::NotFound(request.source_id))?;
  let target = target.ok_or(Error::NotFound(request.target_id))?;

  if !source.is_active() {
    return Err(Error::AlreadyMerged(source.patient_id));
  }
  if !target.is_active() {
    return Err(Error::AlreadyMerged(target.patient_id));
  }
  if source.tenant_id != target.tenant_id {
    return Err(Error::InvalidRequest(format!(
      "patients belong to different tenants ({} / {})",
      source.tenant_id, target.tenant_id
    )));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patient::{PatientStatus, fixtures::patient};

  fn request(source: &PatientRecord, target: &PatientRecord) -> MergeRequest {
    MergeRequest {
      source_id:        source.patient_id,
      target_id:        target.patient_id,
      reason:           "same CPF".into(),
      confidence_score: ConfidenceScore::CERTAIN,
      performed_by:     "dr.reviewer".into(),
    }
  }

  #[test]
  fn accepts_two_active_records_of_one_tenant() {
    let a = patient("c", "A");
    let b = patient("c", "B");
    assert!(validate_merge(&request(&a, &b), Some(&a), Some(&b)).is_ok());
  }

  #[test]
  fn rejects_self_merge() {
    let a = patient("c", "A");
    let err = validate_merge(&request(&a, &a), Some(&a), Some(&a)).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
  }

  #[test]
  fn rejects_missing_records() {
    let a = patient("c", "A");
    let b = patient("c", "B");
    let err = validate_merge(&request(&a, &b), None, Some(&b)).unwrap_err();
    assert!(matches!(err, Error::NotFound(id) if id == a.patient_id));
    let err = validate_merge(&request(&a, &b), Some(&a), None).unwrap_err();
    assert!(matches!(err, Error::NotFound(id) if id == b.patient_id));
  }

  #[test]
  fn rejects_merged_source_or_target() {
    let mut a = patient("c", "A");
    let b = patient("c", "B");
    a.status = PatientStatus::Merged;
    let err = validate_merge(&request(&a, &b), Some(&a), Some(&b)).unwrap_err();
    assert!(matches!(err, Error::AlreadyMerged(id) if id == a.patient_id));

    let err = validate_merge(&request(&b, &a), Some(&b), Some(&a)).unwrap_err();
    assert!(matches!(err, Error::AlreadyMerged(id) if id == a.patient_id));
  }

  #[test]
  fn rejects_cross_tenant_merge() {
    let a = patient("north", "A");
    let b = patient("south", "B");
    let err = validate_merge(&request(&a, &b), Some(&a), Some(&b)).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
  }

  #[test]
  fn rejects_blank_operator() {
    let a = patient("c", "A");
    let b = patient("c", "B");
    let mut req = request(&a, &b);
    req.performed_by = "  ".into();
    assert!(matches!(
      validate_merge(&req, Some(&a), Some(&b)),
      Err(Error::InvalidRequest(_))
    ));
  }
}

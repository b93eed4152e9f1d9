//! The merge transaction.
//!
//! Everything a merge writes happens between one `BEGIN IMMEDIATE` and one
//! `COMMIT`. The write lock is taken before the records are read, so two
//! merges can never interleave; a failure anywhere drops the transaction,
//! which rolls it back.

use rusqlite::{Connection, TransactionBehavior};
use unify_core::{
  artifact::{ArtifactCounts, EntityReassigner},
  merge::{MergeOperation, MergeRequest, validate_merge},
};
use uuid::Uuid;

use crate::{
  Error, Result, audit, candidates,
  encode,
  error::is_busy,
  patients,
};

/// Classify a failure after the transaction has started.
fn fault(stage: &str, e: rusqlite::Error) -> Error {
  if is_busy(&e) {
    unify_core::Error::Conflict(format!("{stage}: {e}")).into()
  } else {
    unify_core::Error::MergeFailed(format!("{stage}: {e}")).into()
  }
}

/// Run `request` against `conn` using `reassigners` in the given order.
pub fn execute<R>(
  conn: &mut Connection,
  reassigners: &[R],
  request: &MergeRequest,
) -> Result<MergeOperation>
where
  R: EntityReassigner<Connection, Error = rusqlite::Error>,
{
  let tx = conn
    .transaction_with_behavior(TransactionBehavior::Immediate)
    .map_err(|e| fault("begin", e))?;

  let source = patients::load(&tx, request.source_id)?;
  let target = patients::load(&tx, request.target_id)?;
  validate_merge(request, source.as_ref(), target.as_ref())?;
  let (Some(source), Some(mut target)) = (source, target) else {
    return Err(unify_core::Error::NotFound(request.source_id).into());
  };

  let mut data_moved = ArtifactCounts::zeroed();
  for r in reassigners {
    let moved = r
      .reassign(&tx, source.patient_id, target.patient_id)
      .map_err(|e| fault(r.kind().as_str(), e))?;
    data_moved.add(r.kind(), moved);
  }

  let now = encode::now();
  let fields_backfilled = target.backfill_from(&source);
  if !fields_backfilled.is_empty() {
    target.updated_at = now;
    patients::write_identity(&tx, &target).map_err(|e| fault("backfill", e))?;
  }

  let retired = patients::retire(&tx, source.patient_id, target.patient_id, now)
    .map_err(|e| fault("retire", e))?;
  if retired != 1 {
    return Err(
      unify_core::Error::Conflict(format!(
        "patient {} changed status during the merge",
        source.patient_id
      ))
      .into(),
    );
  }

  candidates::clear_for_patient(&tx, source.patient_id)
    .map_err(|e| fault("candidates", e))?;

  let op = MergeOperation {
    merge_id: Uuid::new_v4(),
    source_patient_id: source.patient_id,
    target_patient_id: target.patient_id,
    merge_reason: request.reason.clone(),
    confidence_score: request.confidence_score,
    performed_at: now,
    performed_by: request.performed_by.clone(),
    data_moved,
    fields_backfilled: fields_backfilled.into_iter().map(str::to_owned).collect(),
  };
  audit::record(&tx, &op).map_err(|e| fault("audit", e))?;

  tx.commit().map_err(|e| fault("commit", e))?;
  Ok(op)
}

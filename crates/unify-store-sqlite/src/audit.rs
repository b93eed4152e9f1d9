//! The merge audit trail: the single insert performed by a merge, and the
//! read-only history queries.

use rusqlite::{Connection, OptionalExtension as _};
use unify_core::merge::{HistoryQuery, MergeHistoryEntry, MergeOperation};
use uuid::Uuid;

use crate::{
  Result,
  encode::{MERGE_ENTRY_COLUMNS, RawMergeEntry, encode_dt, encode_uuid},
};

/// Insert `op` into `merge_operations`. Storage triggers reject any later
/// UPDATE or DELETE of the row.
pub fn record(conn: &Connection, op: &MergeOperation) -> rusqlite::Result<()> {
  let data_moved = serde_json::to_string(&op.data_moved)
    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
  let backfilled = serde_json::to_string(&op.fields_backfilled)
    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

  conn.execute(
    "INSERT INTO merge_operations (
       merge_id, source_patient_id, target_patient_id, merge_reason,
       confidence_score, performed_at, performed_by, data_moved, fields_backfilled
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      encode_uuid(op.merge_id),
      encode_uuid(op.source_patient_id),
      encode_uuid(op.target_patient_id),
      op.merge_reason,
      op.confidence_score.value(),
      encode_dt(op.performed_at),
      op.performed_by,
      data_moved,
      backfilled,
    ],
  )?;
  Ok(())
}

/// Completed merges, most recent first.
pub fn list(conn: &Connection, query: &HistoryQuery) -> Result<Vec<MergeHistoryEntry>> {
  let patient = query.patient_id.map(encode_uuid);
  let limit = query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
  let offset = query.offset.map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX));

  let mut stmt = conn.prepare(&format!(
    "SELECT {MERGE_ENTRY_COLUMNS}
     FROM merge_operations m
     JOIN patients s ON s.patient_id = m.source_patient_id
     JOIN patients t ON t.patient_id = m.target_patient_id
     WHERE ?1 IS NULL OR m.source_patient_id = ?1 OR m.target_patient_id = ?1
     ORDER BY m.performed_at DESC, m.rowid DESC
     LIMIT ?2 OFFSET ?3"
  ))?;

  let raws = stmt
    .query_map(rusqlite::params![patient, limit, offset], RawMergeEntry::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawMergeEntry::into_entry).collect()
}

pub fn get(conn: &Connection, merge_id: Uuid) -> Result<Option<MergeHistoryEntry>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {MERGE_ENTRY_COLUMNS}
         FROM merge_operations m
         JOIN patients s ON s.patient_id = m.source_patient_id
         JOIN patients t ON t.patient_id = m.target_patient_id
         WHERE m.merge_id = ?1"
      ),
      rusqlite::params![encode_uuid(merge_id)],
      RawMergeEntry::from_row,
    )
    .optional()?;

  raw.map(RawMergeEntry::into_entry).transpose()
}

//! Per-table [`EntityReassigner`]s.

use rusqlite::Connection;
use unify_core::artifact::{ArtifactKind, EntityReassigner};
use uuid::Uuid;

use crate::encode::encode_uuid;

/// Repoints `patient_id` on one artifact table.
#[derive(Debug, Clone, Copy)]
pub struct TableReassigner {
  pub kind:  ArtifactKind,
  pub table: &'static str,
}

/// One reassigner per artifact table, in merge order.
pub const REASSIGNERS: [TableReassigner; 5] = [
  TableReassigner { kind: ArtifactKind::Documents, table: "documents" },
  TableReassigner { kind: ArtifactKind::Appointments, table: "appointments" },
  TableReassigner { kind: ArtifactKind::MedicalRecords, table: "medical_records" },
  TableReassigner { kind: ArtifactKind::Relationships, table: "doctor_patient_relationships" },
  TableReassigner { kind: ArtifactKind::Chat, table: "chat_threads" },
];

/// The artifact table backing `kind`.
pub fn table_for(kind: ArtifactKind) -> &'static str {
  match kind {
    ArtifactKind::Documents => "documents",
    ArtifactKind::Appointments => "appointments",
    ArtifactKind::MedicalRecords => "medical_records",
    ArtifactKind::Relationships => "doctor_patient_relationships",
    ArtifactKind::Chat => "chat_threads",
  }
}

impl EntityReassigner<Connection> for TableReassigner {
  type Error = rusqlite::Error;

  fn kind(&self) -> ArtifactKind { self.kind }

  /// Called with the merge transaction (which derefs to [`Connection`]).
  fn reassign(&self, tx: &Connection, source: Uuid, target: Uuid) -> rusqlite::Result<u64> {
    let changed = tx.execute(
      &format!("UPDATE {} SET patient_id = ?1 WHERE patient_id = ?2", self.table),
      rusqlite::params![encode_uuid(target), encode_uuid(source)],
    )?;
    Ok(changed as u64)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reassigners_follow_merge_order() {
    let kinds: Vec<_> = REASSIGNERS.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, ArtifactKind::MERGE_ORDER);
  }

  #[test]
  fn reassigners_cover_every_artifact_table() {
    let tables: Vec<_> = REASSIGNERS.iter().map(|r| r.table).collect();
    assert_eq!(tables, crate::schema::ARTIFACT_TABLES);
    for r in REASSIGNERS {
      assert_eq!(table_for(r.kind), r.table);
    }
  }
}

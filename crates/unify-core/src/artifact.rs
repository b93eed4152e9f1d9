//! Clinical artifacts and the reassignment contract.
//!
//! The engine treats artifacts as opaque rows that carry an owner reference
//! to a patient record. The only thing it ever does with them is repoint that
//! reference during a merge.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// Artifact types owned by a patient record, in merge order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
  Documents,
  Appointments,
  MedicalRecords,
  /// Doctor–patient relationships.
  Relationships,
  /// Chat threads (messages belong to their thread).
  Chat,
}

impl ArtifactKind {
  /// The fixed order in which a merge reassigns artifacts.
  pub const MERGE_ORDER: [ArtifactKind; 5] = [
    Self::Documents,
    Self::Appointments,
    Self::MedicalRecords,
    Self::Relationships,
    Self::Chat,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Documents => "documents",
      Self::Appointments => "appointments",
      Self::MedicalRecords => "medical_records",
      Self::Relationships => "relationships",
      Self::Chat => "chat",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "documents" => Ok(Self::Documents),
      "appointments" => Ok(Self::Appointments),
      "medical_records" => Ok(Self::MedicalRecords),
      "relationships" => Ok(Self::Relationships),
      "chat" => Ok(Self::Chat),
      other => Err(Error::UnknownArtifactKind(other.to_owned())),
    }
  }
}

// ─── Counts ──────────────────────────────────────────────────────────────────

/// A count per artifact kind. Used both for `data_moved` on a merge and for
/// per-patient ownership tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactCounts(BTreeMap<ArtifactKind, u64>);

impl ArtifactCounts {
  /// All kinds present with a count of zero.
  pub fn zeroed() -> Self {
    Self(ArtifactKind::MERGE_ORDER.iter().map(|k| (*k, 0)).collect())
  }

  pub fn add(&mut self, kind: ArtifactKind, n: u64) {
    *self.0.entry(kind).or_default() += n;
  }

  pub fn get(&self, kind: ArtifactKind) -> u64 {
    self.0.get(&kind).copied().unwrap_or(0)
  }

  pub fn total(&self) -> u64 { self.0.values().sum() }

  pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, u64)> + '_ {
    self.0.iter().map(|(k, v)| (*k, *v))
  }
}

// ─── Artifact rows ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
  pub artifact_id: Uuid,
  pub kind:        ArtifactKind,
  /// The owning patient record.
  pub patient_id:  Uuid,
  /// Short display text (document title, appointment slot, ...).
  pub summary:     String,
  /// Opaque payload owned by the external artifact store.
  pub data:        serde_json::Value,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::IdentityStore::add_artifact`].
#[derive(Debug, Clone)]
pub struct NewArtifact {
  pub kind:       ArtifactKind,
  pub patient_id: Uuid,
  pub summary:    String,
  pub data:       serde_json::Value,
}

impl NewArtifact {
  pub fn new(kind: ArtifactKind, patient_id: Uuid, summary: impl Into<String>) -> Self {
    Self {
      kind,
      patient_id,
      summary: summary.into(),
      data: serde_json::Value::Null,
    }
  }
}

// ─── Reassignment ────────────────────────────────────────────────────────────

/// Repoints the owner of every artifact of one kind from one patient to
/// another, inside a transaction of type `Tx` supplied by the backend.
///
/// Implementations must change only the owner reference, must return the
/// exact number of rows changed, and must tolerate being called again inside
/// the same transaction (the second call finds nothing left and returns 0).
pub trait EntityReassigner<Tx: ?Sized> {
  type Error;

  fn kind(&self) -> ArtifactKind;

  fn reassign(&self, tx: &Tx, source: Uuid, target: Uuid) -> Result<u64, Self::Error>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counts_serialise_as_kind_map() {
    let mut c = ArtifactCounts::default();
    c.add(ArtifactKind::Documents, 3);
    c.add(ArtifactKind::Appointments, 2);
    assert_eq!(
      serde_json::to_value(&c).unwrap(),
      serde_json::json!({ "documents": 3, "appointments": 2 })
    );
    assert_eq!(c.total(), 5);
    assert_eq!(c.get(ArtifactKind::Chat), 0);
  }

  #[test]
  fn zeroed_counts_list_every_kind() {
    let c = ArtifactCounts::zeroed();
    assert_eq!(c.iter().count(), ArtifactKind::MERGE_ORDER.len());
    assert_eq!(c.total(), 0);
  }

  #[test]
  fn kind_names_round_trip() {
    for k in ArtifactKind::MERGE_ORDER {
      assert_eq!(ArtifactKind::parse(k.as_str()).unwrap(), k);
    }
    assert!(ArtifactKind::parse("invoices").is_err());
  }
}

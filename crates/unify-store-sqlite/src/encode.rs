//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so they sort lexically. Dates are `YYYY-MM-DD`. UUIDs are stored as
//! hyphenated lowercase strings. Structured fields are compact JSON.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound as _, Utc};
use unify_core::{
  artifact::{Artifact, ArtifactCounts, ArtifactKind},
  candidate::{CandidateMatch, ConfidenceScore, MatchType, PatientPair},
  merge::{MergeHistoryEntry, MergeOperation},
  patient::{PatientRecord, PatientStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

/// The current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("bad timestamp {s:?}: {e}")))
}

// ─── NaiveDate ────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("bad date {s:?}: {e}")))
}

// ─── PatientStatus ────────────────────────────────────────────────────────────

pub fn encode_status(s: PatientStatus) -> &'static str {
  match s {
    PatientStatus::Active => "active",
    PatientStatus::Merged => "merged",
  }
}

pub fn decode_status(s: &str) -> Result<PatientStatus> {
  match s {
    "active" => Ok(PatientStatus::Active),
    "merged" => Ok(PatientStatus::Merged),
    other => Err(Error::Decode(format!("unknown patient status: {other:?}"))),
  }
}

// ─── Confidence ───────────────────────────────────────────────────────────────

pub fn decode_confidence(v: f64) -> Result<ConfidenceScore> {
  ConfidenceScore::new(v).map_err(|_| Error::Decode(format!("confidence {v} out of range")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawPatient::from_row`].
pub const PATIENT_COLUMNS: &str = "patient_id, tenant_id, full_name, national_id, email, \
   phone, birth_date, gender, address, emergency_contact, medical_condition, status, \
   merged_into, created_at, updated_at";

/// Raw strings read directly from a `patients` row.
pub struct RawPatient {
  pub patient_id:        String,
  pub tenant_id:         String,
  pub full_name:         String,
  pub national_id:       Option<String>,
  pub email:             Option<String>,
  pub phone:             Option<String>,
  pub birth_date:        Option<String>,
  pub gender:            Option<String>,
  pub address:           Option<String>,
  pub emergency_contact: Option<String>,
  pub medical_condition: Option<String>,
  pub status:            String,
  pub merged_into:       Option<String>,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawPatient {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      patient_id:        row.get(0)?,
      tenant_id:         row.get(1)?,
      full_name:         row.get(2)?,
      national_id:       row.get(3)?,
      email:             row.get(4)?,
      phone:             row.get(5)?,
      birth_date:        row.get(6)?,
      gender:            row.get(7)?,
      address:           row.get(8)?,
      emergency_contact: row.get(9)?,
      medical_condition: row.get(10)?,
      status:            row.get(11)?,
      merged_into:       row.get(12)?,
      created_at:        row.get(13)?,
      updated_at:        row.get(14)?,
    })
  }

  pub fn into_patient(self) -> Result<PatientRecord> {
    Ok(PatientRecord {
      patient_id:        decode_uuid(&self.patient_id)?,
      tenant_id:         self.tenant_id,
      full_name:         self.full_name,
      national_id:       self.national_id,
      email:             self.email,
      phone:             self.phone,
      birth_date:        self.birth_date.as_deref().map(decode_date).transpose()?,
      gender:            self.gender,
      address:           self.address,
      emergency_contact: self.emergency_contact,
      medical_condition: self.medical_condition,
      status:            decode_status(&self.status)?,
      merged_into:       self.merged_into.as_deref().map(decode_uuid).transpose()?,
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read from one of the artifact tables.
pub struct RawArtifact {
  pub artifact_id: String,
  pub patient_id:  String,
  pub summary:     String,
  pub data_json:   String,
  pub created_at:  String,
}

impl RawArtifact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      artifact_id: row.get(0)?,
      patient_id:  row.get(1)?,
      summary:     row.get(2)?,
      data_json:   row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  pub fn into_artifact(self, kind: ArtifactKind) -> Result<Artifact> {
    Ok(Artifact {
      artifact_id: decode_uuid(&self.artifact_id)?,
      kind,
      patient_id: decode_uuid(&self.patient_id)?,
      summary: self.summary,
      data: serde_json::from_str(&self.data_json)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `duplicate_candidates` row.
pub struct RawCandidate {
  pub patient_a:   String,
  pub patient_b:   String,
  pub match_type:  String,
  pub confidence:  f64,
  pub detected_at: String,
}

impl RawCandidate {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      patient_a:   row.get(0)?,
      patient_b:   row.get(1)?,
      match_type:  row.get(2)?,
      confidence:  row.get(3)?,
      detected_at: row.get(4)?,
    })
  }

  pub fn into_match(self) -> Result<(CandidateMatch, DateTime<Utc>)> {
    let a = decode_uuid(&self.patient_a)?;
    let b = decode_uuid(&self.patient_b)?;
    let pair = PatientPair::new(a, b)
      .ok_or_else(|| Error::Decode(format!("degenerate candidate pair {a}")))?;
    Ok((
      CandidateMatch {
        pair,
        match_type: MatchType::parse(&self.match_type)?,
        confidence: decode_confidence(self.confidence)?,
      },
      decode_dt(&self.detected_at)?,
    ))
  }
}

/// Column list matching [`RawMergeEntry::from_row`]; expects the audit table
/// aliased `m`, the source patient `s` and the target patient `t`.
pub const MERGE_ENTRY_COLUMNS: &str = "m.merge_id, m.source_patient_id, m.target_patient_id, \
   m.merge_reason, m.confidence_score, m.performed_at, m.performed_by, m.data_moved, \
   m.fields_backfilled, s.full_name, t.full_name";

/// Raw values read from `merge_operations` joined with both patients.
pub struct RawMergeEntry {
  pub merge_id:          String,
  pub source_patient_id: String,
  pub target_patient_id: String,
  pub merge_reason:      String,
  pub confidence_score:  f64,
  pub performed_at:      String,
  pub performed_by:      String,
  pub data_moved:        String,
  pub fields_backfilled: String,
  pub source_name:       String,
  pub target_name:       String,
}

impl RawMergeEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      merge_id:          row.get(0)?,
      source_patient_id: row.get(1)?,
      target_patient_id: row.get(2)?,
      merge_reason:      row.get(3)?,
      confidence_score:  row.get(4)?,
      performed_at:      row.get(5)?,
      performed_by:      row.get(6)?,
      data_moved:        row.get(7)?,
      fields_backfilled: row.get(8)?,
      source_name:       row.get(9)?,
      target_name:       row.get(10)?,
    })
  }

  pub fn into_entry(self) -> Result<MergeHistoryEntry> {
    let data_moved: ArtifactCounts = serde_json::from_str(&self.data_moved)?;
    Ok(MergeHistoryEntry {
      operation:   MergeOperation {
        merge_id:          decode_uuid(&self.merge_id)?,
        source_patient_id: decode_uuid(&self.source_patient_id)?,
        target_patient_id: decode_uuid(&self.target_patient_id)?,
        merge_reason:      self.merge_reason,
        confidence_score:  decode_confidence(self.confidence_score)?,
        performed_at:      decode_dt(&self.performed_at)?,
        performed_by:      self.performed_by,
        data_moved,
        fields_backfilled: serde_json::from_str(&self.fields_backfilled)?,
      },
      source_name: self.source_name,
      target_name: self.target_name,
    })
  }
}

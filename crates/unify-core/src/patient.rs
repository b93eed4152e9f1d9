//! Patient identity records.
//!
//! A patient record is created by one of the platform's intake paths and is
//! never deleted. The engine only ever touches it in two ways: a merge retires
//! it (`status` becomes [`PatientStatus::Merged`] and `merged_into` is set) or
//! a merge fills its absent fields from a retired duplicate.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle of a patient record. `Active → Merged` is the only transition,
/// and it is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientStatus {
  #[default]
  Active,
  Merged,
}

// ─── Record ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
  pub patient_id:        Uuid,
  /// The clinic the record belongs to. Records never pair or merge across
  /// tenants.
  pub tenant_id:         String,
  pub full_name:         String,
  /// National identity number (CPF). Compared on digits only.
  pub national_id:       Option<String>,
  pub email:             Option<String>,
  pub phone:             Option<String>,
  pub birth_date:        Option<NaiveDate>,
  pub gender:            Option<String>,
  pub address:           Option<String>,
  pub emergency_contact: Option<String>,
  pub medical_condition: Option<String>,
  pub status:            PatientStatus,
  /// Set exactly when `status` is `Merged`.
  pub merged_into:       Option<Uuid>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

impl PatientRecord {
  pub fn is_active(&self) -> bool { self.status == PatientStatus::Active }

  /// Fill every absent field of `self` from `source`, never overwriting a
  /// value that is already present. Returns the names of the filled fields.
  ///
  /// | Field | Policy |
  /// |-------|--------|
  /// | `full_name` | never changed (always present) |
  /// | optional text fields | filled when `None` or blank |
  /// | `birth_date` | filled when `None` |
  /// | `tenant_id`, `status`, `merged_into`, timestamps | never copied |
  pub fn backfill_from(&mut self, source: &PatientRecord) -> Vec<&'static str> {
    let mut filled = Vec::new();

    let text_fields: [(&'static str, &mut Option<String>, &Option<String>); 7] = [
      ("national_id", &mut self.national_id, &source.national_id),
      ("email", &mut self.email, &source.email),
      ("phone", &mut self.phone, &source.phone),
      ("gender", &mut self.gender, &source.gender),
      ("address", &mut self.address, &source.address),
      ("emergency_contact", &mut self.emergency_contact, &source.emergency_contact),
      ("medical_condition", &mut self.medical_condition, &source.medical_condition),
    ];

    for (name, target, source) in text_fields {
      if is_blank(target.as_deref())
        && let Some(value) = source.as_deref().filter(|v| !v.trim().is_empty())
      {
        *target = Some(value.to_owned());
        filled.push(name);
      }
    }

    if self.birth_date.is_none() && source.birth_date.is_some() {
      self.birth_date = source.birth_date;
      filled.push("birth_date");
    }

    filled
  }
}

fn is_blank(value: Option<&str>) -> bool {
  value.is_none_or(|v| v.trim().is_empty())
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::IdentityStore::add_patient`]. Used by intake
/// adapters; the engine itself never creates patients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
  pub tenant_id:         String,
  pub full_name:         String,
  pub national_id:       Option<String>,
  pub email:             Option<String>,
  pub phone:             Option<String>,
  pub birth_date:        Option<NaiveDate>,
  pub gender:            Option<String>,
  pub address:           Option<String>,
  pub emergency_contact: Option<String>,
  pub medical_condition: Option<String>,
}

impl NewPatient {
  pub fn new(tenant_id: impl Into<String>, full_name: impl Into<String>) -> Self {
    Self {
      tenant_id: tenant_id.into(),
      full_name: full_name.into(),
      ..Self::default()
    }
  }
}

/// A profile edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientUpdate {
  pub full_name:         Option<String>,
  pub national_id:       Option<String>,
  pub email:             Option<String>,
  pub phone:             Option<String>,
  pub birth_date:        Option<NaiveDate>,
  pub gender:            Option<String>,
  pub address:           Option<String>,
  pub emergency_contact: Option<String>,
  pub medical_condition: Option<String>,
}

impl PatientUpdate {
  /// Apply the edit to `record` in place.
  pub fn apply(self, record: &mut PatientRecord) {
    if let Some(v) = self.full_name { record.full_name = v; }
    if let Some(v) = self.national_id { record.national_id = Some(v); }
    if let Some(v) = self.email { record.email = Some(v); }
    if let Some(v) = self.phone { record.phone = Some(v); }
    if let Some(v) = self.birth_date { record.birth_date = Some(v); }
    if let Some(v) = self.gender { record.gender = Some(v); }
    if let Some(v) = self.address { record.address = Some(v); }
    if let Some(v) = self.emergency_contact { record.emergency_contact = Some(v); }
    if let Some(v) = self.medical_condition { record.medical_condition = Some(v); }
  }
}

/// Parameters for [`crate::store::IdentityStore::list_patients`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientQuery {
  pub tenant_id:      Option<String>,
  /// Include retired (merged) records. Default `false`.
  #[serde(default)]
  pub include_merged: bool,
}

#[cfg(test)]
pub(crate) mod fixtures {
  use super::*;

  pub fn patient(tenant: &str, name: &str) -> PatientRecord {
    let now = Utc::now();
    PatientRecord {
      patient_id:        Uuid::new_v4(),
      tenant_id:         tenant.into(),
      full_name:         name.into(),
      national_id:       None,
      email:             None,
      phone:             None,
      birth_date:        None,
      gender:            None,
      address:           None,
      emergency_contact: None,
      medical_condition: None,
      status:            PatientStatus::Active,
      merged_into:       None,
      created_at:        now,
      updated_at:        now,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{fixtures::patient, *};

  #[test]
  fn backfill_fills_only_absent_fields() {
    let mut target = patient("clinic", "Maria Silva");
    target.email = Some("maria@example.com".into());
    target.address = Some("   ".into());

    let mut source = patient("clinic", "Maria da Silva");
    source.email = Some("other@example.com".into());
    source.national_id = Some("111.444.777-35".into());
    source.address = Some("Rua A, 10".into());
    source.birth_date = NaiveDate::from_ymd_opt(1980, 5, 17);

    let filled = target.backfill_from(&source);

    assert_eq!(filled, vec!["national_id", "address", "birth_date"]);
    assert_eq!(target.full_name, "Maria Silva");
    assert_eq!(target.email.as_deref(), Some("maria@example.com"));
    assert_eq!(target.national_id.as_deref(), Some("111.444.777-35"));
    assert_eq!(target.address.as_deref(), Some("Rua A, 10"));
    assert_eq!(target.birth_date, NaiveDate::from_ymd_opt(1980, 5, 17));
  }

  #[test]
  fn backfill_never_overwrites_birth_date() {
    let mut target = patient("clinic", "A");
    target.birth_date = NaiveDate::from_ymd_opt(1990, 1, 1);
    let mut source = patient("clinic", "A");
    source.birth_date = NaiveDate::from_ymd_opt(1991, 1, 1);

    assert!(target.backfill_from(&source).is_empty());
    assert_eq!(target.birth_date, NaiveDate::from_ymd_opt(1990, 1, 1));
  }

  #[test]
  fn backfill_ignores_blank_source_values() {
    let mut target = patient("clinic", "A");
    let mut source = patient("clinic", "A");
    source.phone = Some("".into());

    assert!(target.backfill_from(&source).is_empty());
    assert!(target.phone.is_none());
  }

  #[test]
  fn update_leaves_unspecified_fields() {
    let mut record = patient("clinic", "Old Name");
    record.email = Some("keep@example.com".into());

    PatientUpdate {
      full_name: Some("New Name".into()),
      ..Default::default()
    }
    .apply(&mut record);

    assert_eq!(record.full_name, "New Name");
    assert_eq!(record.email.as_deref(), Some("keep@example.com"));
  }
}

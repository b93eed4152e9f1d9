//! Synchronous `patients` row helpers, shared by the store methods and the
//! merge transaction.

use rusqlite::{Connection, OptionalExtension as _};
use unify_core::patient::{PatientQuery, PatientRecord, PatientUpdate};
use uuid::Uuid;

use crate::{
  Result,
  encode::{PATIENT_COLUMNS, RawPatient, encode_date, encode_dt, encode_status, encode_uuid},
};

pub fn insert(conn: &Connection, p: &PatientRecord) -> Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO patients ({PATIENT_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
    ),
    rusqlite::params![
      encode_uuid(p.patient_id),
      p.tenant_id,
      p.full_name,
      p.national_id,
      p.email,
      p.phone,
      p.birth_date.map(encode_date),
      p.gender,
      p.address,
      p.emergency_contact,
      p.medical_condition,
      encode_status(p.status),
      p.merged_into.map(encode_uuid),
      encode_dt(p.created_at),
      encode_dt(p.updated_at),
    ],
  )?;
  Ok(())
}

pub fn load(conn: &Connection, id: Uuid) -> Result<Option<PatientRecord>> {
  let raw = conn
    .query_row(
      &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_id = ?1"),
      rusqlite::params![encode_uuid(id)],
      RawPatient::from_row,
    )
    .optional()?;

  raw.map(RawPatient::into_patient).transpose()
}

pub fn list(conn: &Connection, query: &PatientQuery) -> Result<Vec<PatientRecord>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PATIENT_COLUMNS} FROM patients
     WHERE (?1 IS NULL OR tenant_id = ?1)
       AND (?2 OR status = 'active')
     ORDER BY created_at, patient_id"
  ))?;

  let raws = stmt
    .query_map(
      rusqlite::params![query.tenant_id, query.include_merged],
      RawPatient::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  raws.into_iter().map(RawPatient::into_patient).collect()
}

/// Overwrite the identity fields of an existing row with those of `p`.
/// Status, tenant and `merged_into` are never written here.
pub fn write_identity(conn: &Connection, p: &PatientRecord) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE patients SET
       full_name = ?1, national_id = ?2, email = ?3, phone = ?4, birth_date = ?5,
       gender = ?6, address = ?7, emergency_contact = ?8, medical_condition = ?9,
       updated_at = ?10
     WHERE patient_id = ?11",
    rusqlite::params![
      p.full_name,
      p.national_id,
      p.email,
      p.phone,
      p.birth_date.map(encode_date),
      p.gender,
      p.address,
      p.emergency_contact,
      p.medical_condition,
      encode_dt(p.updated_at),
      encode_uuid(p.patient_id),
    ],
  )
}

/// Retire `source` into `target`. Only succeeds while the source is still
/// active; returns the number of rows changed (0 or 1).
pub fn retire(
  conn: &Connection,
  source: Uuid,
  target: Uuid,
  at: chrono::DateTime<chrono::Utc>,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE patients SET status = 'merged', merged_into = ?1, updated_at = ?2
     WHERE patient_id = ?3 AND status = 'active'",
    rusqlite::params![encode_uuid(target), encode_dt(at), encode_uuid(source)],
  )
}

/// Apply `update` to an active patient and return the stored result.
pub fn update(conn: &mut Connection, id: Uuid, update: PatientUpdate) -> Result<PatientRecord> {
  let tx = conn.transaction()?;
  let mut record = load(&tx, id)?.ok_or(unify_core::Error::NotFound(id))?;
  if !record.is_active() {
    return Err(unify_core::Error::AlreadyMerged(id).into());
  }
  update.apply(&mut record);
  record.updated_at = crate::encode::now();
  write_identity(&tx, &record)?;
  tx.commit()?;
  Ok(record)
}

//! Stored duplicate candidates and dismissals.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use unify_core::candidate::{
  CandidateDismissal, CandidateMatch, DetectionScope, DuplicateCandidate, MatchType,
  PatientPair, union_matches,
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawCandidate, decode_uuid, encode_dt, encode_uuid},
};

/// Stored rows whose pair falls inside `scope`, with their detection times.
fn load_scoped(
  conn: &Connection,
  scope: &DetectionScope,
) -> Result<Vec<(CandidateMatch, DateTime<Utc>)>> {
  let mut stmt = conn.prepare(
    "SELECT c.patient_a, c.patient_b, c.match_type, c.confidence, c.detected_at, p.tenant_id
     FROM duplicate_candidates c
     JOIN patients p ON p.patient_id = c.patient_a",
  )?;

  let rows = stmt
    .query_map([], |row| Ok((RawCandidate::from_row(row)?, row.get::<_, String>(5)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut out = Vec::with_capacity(rows.len());
  for (raw, tenant) in rows {
    if !scope.includes_tenant(&tenant) {
      continue;
    }
    let (m, at) = raw.into_match()?;
    if scope.includes_pair(&m.pair) {
      out.push((m, at));
    }
  }
  Ok(out)
}

fn active_patients(conn: &Connection) -> Result<HashSet<Uuid>> {
  let mut stmt = conn.prepare("SELECT patient_id FROM patients WHERE status = 'active'")?;
  let raws = stmt
    .query_map([], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.iter().map(|id| decode_uuid(id)).collect()
}

fn dismissed_pairs(conn: &Connection) -> Result<HashSet<PatientPair>> {
  let mut stmt = conn.prepare("SELECT patient_a, patient_b FROM candidate_dismissals")?;
  let raws = stmt
    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut out = HashSet::with_capacity(raws.len());
  for (a, b) in raws {
    if let Some(pair) = PatientPair::new(decode_uuid(&a)?, decode_uuid(&b)?) {
      out.insert(pair);
    }
  }
  Ok(out)
}

fn delete_row(conn: &Connection, pair: &PatientPair, match_type: MatchType) -> rusqlite::Result<()> {
  conn.execute(
    "DELETE FROM duplicate_candidates
     WHERE patient_a = ?1 AND patient_b = ?2 AND match_type = ?3",
    rusqlite::params![
      encode_uuid(pair.patient_a),
      encode_uuid(pair.patient_b),
      match_type.as_str(),
    ],
  )?;
  Ok(())
}

/// Replace the stored rows covered by `scope` with `matches` in one
/// transaction. Rows that survive keep their first `detected_at`. Matches
/// touching a record merged since the scan read it are dropped.
pub fn replace(
  conn: &mut Connection,
  scope: &DetectionScope,
  matches: &[CandidateMatch],
  detected_at: DateTime<Utc>,
) -> Result<Vec<DuplicateCandidate>> {
  let tx = conn.transaction()?;

  let dismissed = dismissed_pairs(&tx)?;
  let active = active_patients(&tx)?;
  let fresh: Vec<&CandidateMatch> = matches
    .iter()
    .filter(|m| !dismissed.contains(&m.pair))
    .filter(|m| active.contains(&m.pair.patient_a) && active.contains(&m.pair.patient_b))
    .collect();
  let fresh_keys: HashSet<(PatientPair, MatchType)> =
    fresh.iter().map(|m| (m.pair, m.match_type)).collect();

  for (old, _) in load_scoped(&tx, scope)? {
    if !fresh_keys.contains(&(old.pair, old.match_type)) {
      delete_row(&tx, &old.pair, old.match_type)?;
    }
  }

  let at = encode_dt(detected_at);
  for m in fresh {
    tx.execute(
      "INSERT INTO duplicate_candidates (patient_a, patient_b, match_type, confidence, detected_at)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT (patient_a, patient_b, match_type)
       DO UPDATE SET confidence = excluded.confidence",
      rusqlite::params![
        encode_uuid(m.pair.patient_a),
        encode_uuid(m.pair.patient_b),
        m.match_type.as_str(),
        m.confidence.value(),
        at,
      ],
    )?;
  }

  let stored = list(&tx, scope)?;
  tx.commit()?;
  Ok(stored)
}

/// Stored candidates for `scope`, unioned per pair and ranked.
pub fn list(conn: &Connection, scope: &DetectionScope) -> Result<Vec<DuplicateCandidate>> {
  Ok(union_matches(load_scoped(conn, scope)?))
}

pub fn dismiss(conn: &mut Connection, d: &CandidateDismissal) -> Result<()> {
  let a = encode_uuid(d.pair.patient_a);
  let b = encode_uuid(d.pair.patient_b);

  let tx = conn.transaction()?;
  tx.execute(
    "INSERT INTO candidate_dismissals (patient_a, patient_b, dismissed_by, reason, dismissed_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT (patient_a, patient_b)
     DO UPDATE SET dismissed_by = excluded.dismissed_by,
                   reason       = excluded.reason,
                   dismissed_at = excluded.dismissed_at",
    rusqlite::params![a, b, d.dismissed_by, d.reason, encode_dt(d.dismissed_at)],
  )?;
  tx.execute(
    "DELETE FROM duplicate_candidates WHERE patient_a = ?1 AND patient_b = ?2",
    rusqlite::params![a, b],
  )?;
  tx.commit()?;
  Ok(())
}

/// Drop every stored row involving `patient`; used when it is merged away.
pub fn clear_for_patient(conn: &Connection, patient: Uuid) -> rusqlite::Result<usize> {
  let id = encode_uuid(patient);
  conn.execute(
    "DELETE FROM duplicate_candidates WHERE patient_a = ?1 OR patient_b = ?1",
    rusqlite::params![id],
  )
}

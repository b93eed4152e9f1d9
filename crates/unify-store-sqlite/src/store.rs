//! [`SqliteStore`] — the SQLite implementation of [`IdentityStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use unify_core::{
  artifact::{Artifact, ArtifactCounts, ArtifactKind, NewArtifact},
  candidate::{CandidateDismissal, CandidateMatch, DetectionScope, DuplicateCandidate},
  merge::{HistoryQuery, MergeHistoryEntry, MergeOperation, MergeRequest},
  patient::{NewPatient, PatientQuery, PatientRecord, PatientStatus, PatientUpdate},
  store::IdentityStore,
};

use crate::{
  Error, Result, audit, candidates,
  encode::{self, RawArtifact, encode_dt, encode_uuid},
  merge, patients,
  reassign::{REASSIGNERS, table_for},
  schema::SCHEMA,
};

/// How long a writer waits for another connection's lock before giving up
/// with a retryable conflict.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Unify identity store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All calls on
/// one store run on the same background thread, one at a time.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with(path, DEFAULT_BUSY_TIMEOUT).await
  }

  /// Like [`open`](Self::open) with an explicit lock wait bound.
  pub async fn open_with(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  async fn init(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  type Error = Error;

  // ── Patients ──────────────────────────────────────────────────────────────

  async fn add_patient(&self, input: NewPatient) -> Result<PatientRecord> {
    let now = encode::now();
    let patient = PatientRecord {
      patient_id:        Uuid::new_v4(),
      tenant_id:         input.tenant_id,
      full_name:         input.full_name,
      national_id:       input.national_id,
      email:             input.email,
      phone:             input.phone,
      birth_date:        input.birth_date,
      gender:            input.gender,
      address:           input.address,
      emergency_contact: input.emergency_contact,
      medical_condition: input.medical_condition,
      status:            PatientStatus::Active,
      merged_into:       None,
      created_at:        now,
      updated_at:        now,
    };

    let row = patient.clone();
    self
      .conn
      .call(move |conn| Ok(patients::insert(conn, &row)))
      .await??;

    Ok(patient)
  }

  async fn get_patient(&self, id: Uuid) -> Result<Option<PatientRecord>> {
    self.conn.call(move |conn| Ok(patients::load(conn, id))).await?
  }

  async fn list_patients(&self, query: &PatientQuery) -> Result<Vec<PatientRecord>> {
    let query = query.clone();
    self.conn.call(move |conn| Ok(patients::list(conn, &query))).await?
  }

  async fn update_patient(&self, id: Uuid, update: PatientUpdate) -> Result<PatientRecord> {
    self
      .conn
      .call(move |conn| Ok(patients::update(conn, id, update)))
      .await?
  }

  // ── Artifacts ─────────────────────────────────────────────────────────────

  async fn add_artifact(&self, input: NewArtifact) -> Result<Artifact> {
    let artifact = Artifact {
      artifact_id: Uuid::new_v4(),
      kind:        input.kind,
      patient_id:  input.patient_id,
      summary:     input.summary,
      data:        input.data,
      created_at:  encode::now(),
    };

    let table = table_for(artifact.kind);
    let id_str = encode_uuid(artifact.artifact_id);
    let patient_str = encode_uuid(artifact.patient_id);
    let summary = artifact.summary.clone();
    let data_json = artifact.data.to_string();
    let at_str = encode_dt(artifact.created_at);

    let owner = artifact.patient_id;
    self
      .conn
      .call(move |conn| {
        // A retired record never gains artifacts; the owner check and the
        // insert are one statement.
        let inserted = conn.execute(
          &format!(
            "INSERT INTO {table} (artifact_id, patient_id, summary, data_json, created_at)
             SELECT ?1, patient_id, ?3, ?4, ?5 FROM patients
             WHERE patient_id = ?2 AND status = 'active'"
          ),
          rusqlite::params![id_str, patient_str, summary, data_json, at_str],
        )?;
        if inserted == 1 {
          return Ok(Ok(()));
        }
        Ok(match patients::load(conn, owner) {
          Ok(Some(_)) => Err(unify_core::Error::AlreadyMerged(owner).into()),
          Ok(None) => Err(unify_core::Error::NotFound(owner).into()),
          Err(e) => Err(e),
        })
      })
      .await??;

    Ok(artifact)
  }

  async fn list_artifacts(
    &self,
    patient_id: Uuid,
    kind: Option<ArtifactKind>,
  ) -> Result<Vec<Artifact>> {
    let kinds: Vec<ArtifactKind> = match kind {
      Some(k) => vec![k],
      None => ArtifactKind::MERGE_ORDER.to_vec(),
    };
    let patient_str = encode_uuid(patient_id);

    let raws: Vec<(ArtifactKind, RawArtifact)> = self
      .conn
      .call(move |conn| {
        let mut out = Vec::new();
        for kind in kinds {
          let mut stmt = conn.prepare(&format!(
            "SELECT artifact_id, patient_id, summary, data_json, created_at
             FROM {} WHERE patient_id = ?1 ORDER BY created_at, artifact_id",
            table_for(kind)
          ))?;
          let rows = stmt
            .query_map(rusqlite::params![patient_str], RawArtifact::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.extend(rows.into_iter().map(|r| (kind, r)));
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|(kind, raw)| raw.into_artifact(kind))
      .collect()
  }

  async fn count_artifacts(&self, patient_id: Uuid) -> Result<ArtifactCounts> {
    let patient_str = encode_uuid(patient_id);

    let counts = self
      .conn
      .call(move |conn| {
        let mut counts = ArtifactCounts::zeroed();
        for r in REASSIGNERS {
          let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE patient_id = ?1", r.table),
            rusqlite::params![patient_str],
            |row| row.get(0),
          )?;
          counts.add(r.kind, n as u64);
        }
        Ok(counts)
      })
      .await?;

    Ok(counts)
  }

  // ── Candidates ────────────────────────────────────────────────────────────

  async fn replace_candidates(
    &self,
    scope: &DetectionScope,
    matches: Vec<CandidateMatch>,
    detected_at: DateTime<Utc>,
  ) -> Result<Vec<DuplicateCandidate>> {
    let scope = scope.clone();
    self
      .conn
      .call(move |conn| Ok(candidates::replace(conn, &scope, &matches, detected_at)))
      .await?
  }

  async fn list_candidates(&self, scope: &DetectionScope) -> Result<Vec<DuplicateCandidate>> {
    let scope = scope.clone();
    self
      .conn
      .call(move |conn| Ok(candidates::list(conn, &scope)))
      .await?
  }

  async fn dismiss_candidate(&self, dismissal: CandidateDismissal) -> Result<()> {
    self
      .conn
      .call(move |conn| Ok(candidates::dismiss(conn, &dismissal)))
      .await?
  }

  // ── Merge ─────────────────────────────────────────────────────────────────

  async fn merge(&self, request: MergeRequest) -> Result<MergeOperation> {
    self
      .conn
      .call(move |conn| Ok(merge::execute(conn, &REASSIGNERS, &request)))
      .await?
  }

  // ── Audit reads ───────────────────────────────────────────────────────────

  async fn merge_history(&self, query: &HistoryQuery) -> Result<Vec<MergeHistoryEntry>> {
    let query = query.clone();
    self.conn.call(move |conn| Ok(audit::list(conn, &query))).await?
  }

  async fn get_merge(&self, merge_id: Uuid) -> Result<Option<MergeHistoryEntry>> {
    self.conn.call(move |conn| Ok(audit::get(conn, merge_id))).await?
  }
}

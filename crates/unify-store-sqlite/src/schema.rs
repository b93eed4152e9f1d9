//! SQL schema for the Unify SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Artifact tables, one per [`unify_core::artifact::ArtifactKind`]. Each row
/// references its owning patient through `patient_id`; nothing else in the
/// row is interpreted by the engine.
pub const ARTIFACT_TABLES: [&str; 5] = [
  "documents",
  "appointments",
  "medical_records",
  "doctor_patient_relationships",
  "chat_threads",
];

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Patient records are never deleted.
CREATE TABLE IF NOT EXISTS patients (
    patient_id        TEXT PRIMARY KEY,
    tenant_id         TEXT NOT NULL,
    full_name         TEXT NOT NULL,
    national_id       TEXT,
    email             TEXT,
    phone             TEXT,
    birth_date        TEXT,            -- YYYY-MM-DD
    gender            TEXT,
    address           TEXT,
    emergency_contact TEXT,
    medical_condition TEXT,
    status            TEXT NOT NULL DEFAULT 'active',   -- 'active' | 'merged'
    merged_into       TEXT REFERENCES patients(patient_id),
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    CHECK (status IN ('active', 'merged')),
    CHECK ((status = 'merged') = (merged_into IS NOT NULL)),
    CHECK (merged_into IS NULL OR merged_into != patient_id)
);

-- active -> merged is terminal.
CREATE TRIGGER IF NOT EXISTS patients_status_terminal
BEFORE UPDATE OF status, merged_into ON patients
WHEN OLD.status = 'merged'
BEGIN
    SELECT RAISE(ABORT, 'merged patient records are immutable');
END;

CREATE TRIGGER IF NOT EXISTS patients_no_delete
BEFORE DELETE ON patients
BEGIN
    SELECT RAISE(ABORT, 'patient records are never deleted');
END;

CREATE TABLE IF NOT EXISTS documents (
    artifact_id TEXT PRIMARY KEY,
    patient_id  TEXT NOT NULL REFERENCES patients(patient_id),
    summary     TEXT NOT NULL,
    data_json   TEXT NOT NULL DEFAULT 'null',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS appointments (
    artifact_id TEXT PRIMARY KEY,
    patient_id  TEXT NOT NULL REFERENCES patients(patient_id),
    summary     TEXT NOT NULL,
    data_json   TEXT NOT NULL DEFAULT 'null',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medical_records (
    artifact_id TEXT PRIMARY KEY,
    patient_id  TEXT NOT NULL REFERENCES patients(patient_id),
    summary     TEXT NOT NULL,
    data_json   TEXT NOT NULL DEFAULT 'null',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doctor_patient_relationships (
    artifact_id TEXT PRIMARY KEY,
    patient_id  TEXT NOT NULL REFERENCES patients(patient_id),
    summary     TEXT NOT NULL,
    data_json   TEXT NOT NULL DEFAULT 'null',
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_threads (
    artifact_id TEXT PRIMARY KEY,
    patient_id  TEXT NOT NULL REFERENCES patients(patient_id),
    summary     TEXT NOT NULL,
    data_json   TEXT NOT NULL DEFAULT 'null',
    created_at  TEXT NOT NULL
);

-- One row per (pair, tier); patient_a < patient_b.
CREATE TABLE IF NOT EXISTS duplicate_candidates (
    patient_a   TEXT NOT NULL REFERENCES patients(patient_id),
    patient_b   TEXT NOT NULL REFERENCES patients(patient_id),
    match_type  TEXT NOT NULL,   -- 'CPF_EXACT' | 'EMAIL_EXACT' | 'NAME_DOB_SIMILAR'
    confidence  REAL NOT NULL,
    detected_at TEXT NOT NULL,
    PRIMARY KEY (patient_a, patient_b, match_type),
    CHECK (patient_a < patient_b),
    CHECK (confidence >= 0.0 AND confidence <= 1.0)
);

CREATE TABLE IF NOT EXISTS candidate_dismissals (
    patient_a    TEXT NOT NULL REFERENCES patients(patient_id),
    patient_b    TEXT NOT NULL REFERENCES patients(patient_id),
    dismissed_by TEXT NOT NULL,
    reason       TEXT,
    dismissed_at TEXT NOT NULL,
    PRIMARY KEY (patient_a, patient_b)
);

-- The audit trail. Strictly append-only.
CREATE TABLE IF NOT EXISTS merge_operations (
    merge_id          TEXT PRIMARY KEY,
    source_patient_id TEXT NOT NULL UNIQUE REFERENCES patients(patient_id),
    target_patient_id TEXT NOT NULL REFERENCES patients(patient_id),
    merge_reason      TEXT NOT NULL,
    confidence_score  REAL NOT NULL,
    performed_at      TEXT NOT NULL,
    performed_by      TEXT NOT NULL,
    data_moved        TEXT NOT NULL,   -- JSON object, artifact kind -> count
    fields_backfilled TEXT NOT NULL DEFAULT '[]',
    CHECK (source_patient_id != target_patient_id),
    CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0)
);

CREATE TRIGGER IF NOT EXISTS merge_operations_no_update
BEFORE UPDATE ON merge_operations
BEGIN
    SELECT RAISE(ABORT, 'merge_operations is append-only');
END;

CREATE TRIGGER IF NOT EXISTS merge_operations_no_delete
BEFORE DELETE ON merge_operations
BEGIN
    SELECT RAISE(ABORT, 'merge_operations is append-only');
END;

CREATE INDEX IF NOT EXISTS patients_tenant_idx       ON patients(tenant_id, status);
CREATE INDEX IF NOT EXISTS documents_patient_idx     ON documents(patient_id);
CREATE INDEX IF NOT EXISTS appointments_patient_idx  ON appointments(patient_id);
CREATE INDEX IF NOT EXISTS medical_records_pat_idx   ON medical_records(patient_id);
CREATE INDEX IF NOT EXISTS relationships_patient_idx ON doctor_patient_relationships(patient_id);
CREATE INDEX IF NOT EXISTS chat_threads_patient_idx  ON chat_threads(patient_id);
CREATE INDEX IF NOT EXISTS candidates_b_idx          ON duplicate_candidates(patient_b);
CREATE INDEX IF NOT EXISTS merges_target_idx         ON merge_operations(target_patient_id);
CREATE INDEX IF NOT EXISTS merges_performed_idx      ON merge_operations(performed_at);

PRAGMA user_version = 1;
";

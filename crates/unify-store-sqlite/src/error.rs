//! Error type for `unify-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] unify_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored value could not be decoded into its domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether SQLite refused the statement because another connection holds the
/// write lock past the busy timeout.
pub fn is_busy(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if matches!(f.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
  )
}

impl From<Error> for unify_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      Error::Sqlite(ref sql) if is_busy(sql) => {
        unify_core::Error::Conflict(format!("database is locked: {sql}"))
      }
      Error::Database(tokio_rusqlite::Error::Rusqlite(ref sql)) if is_busy(sql) => {
        unify_core::Error::Conflict(format!("database is locked: {sql}"))
      }
      other => unify_core::Error::Storage(Box::new(other)),
    }
  }
}

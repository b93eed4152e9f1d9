//! Error types for `unify-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// The request is malformed: self-merge, cross-tenant merge, blank
  /// operator, out-of-range score, and so on.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("patient not found: {0}")]
  NotFound(Uuid),

  /// The patient has already been merged into another record.
  #[error("patient {0} is already merged")]
  AlreadyMerged(Uuid),

  /// Lost a race against a concurrent merge, or could not acquire the write
  /// lock in time. Retrying from scratch is safe.
  #[error("conflict: {0}")]
  Conflict(String),

  /// The merge transaction failed part-way and was rolled back.
  #[error("merge failed and was rolled back: {0}")]
  MergeFailed(String),

  #[error("unknown match type: {0:?}")]
  UnknownMatchType(String),

  #[error("unknown artifact kind: {0:?}")]
  UnknownArtifactKind(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

/// The wire-level classification of an [`Error`], transmitted as a string
/// enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
  InvalidRequest,
  NotFound,
  AlreadyMerged,
  Conflict,
  MergeFailed,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::AlreadyMerged(_) => ErrorKind::AlreadyMerged,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::MergeFailed(_) => ErrorKind::MergeFailed,
      Self::UnknownMatchType(_)
      | Self::UnknownArtifactKind(_)
      | Self::Storage(_)
      | Self::Serialization(_) => ErrorKind::Internal,
    }
  }

  /// Whether the same request may succeed if re-issued unchanged.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Conflict(_) | Self::MergeFailed(_))
  }

  /// Whether the error means another merge already claimed the record.
  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::Conflict(_) | Self::AlreadyMerged(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn conflict_class_covers_lost_races_and_merged_records() {
    assert!(Error::AlreadyMerged(Uuid::new_v4()).is_conflict());
    assert!(Error::Conflict("locked".into()).is_conflict());
    assert!(!Error::NotFound(Uuid::new_v4()).is_conflict());
  }

  #[test]
  fn only_transient_errors_are_retryable() {
    assert!(Error::MergeFailed("disk".into()).is_retryable());
    assert!(Error::Conflict("busy".into()).is_retryable());
    assert!(!Error::AlreadyMerged(Uuid::new_v4()).is_retryable());
    assert!(!Error::InvalidRequest("self".into()).is_retryable());
  }

  #[test]
  fn kind_serialises_as_plain_string() {
    let json = serde_json::to_string(&ErrorKind::AlreadyMerged).unwrap();
    assert_eq!(json, "\"AlreadyMerged\"");
  }
}

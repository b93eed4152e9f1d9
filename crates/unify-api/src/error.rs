//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure is rendered as
//! `{"error": {"kind": "<Kind>", "message": "...", "retryable": bool}}`.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use unify_core::ErrorKind;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Engine(#[from] unify_core::Error),

  #[error("malformed body: {0}")]
  Body(#[from] JsonRejection),

  #[error("malformed query: {0}")]
  Query(#[from] QueryRejection),
}

impl ApiError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ApiError::Engine(e) => e.kind(),
      ApiError::Body(_) | ApiError::Query(_) => ErrorKind::InvalidRequest,
    }
  }

  fn retryable(&self) -> bool {
    matches!(self, ApiError::Engine(e) if e.is_retryable())
  }
}

/// The HTTP status an error of `kind` is reported with.
pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::AlreadyMerged | ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::MergeFailed => StatusCode::SERVICE_UNAVAILABLE,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    let body = json!({
      "error": {
        "kind":      kind,
        "message":   self.to_string(),
        "retryable": self.retryable(),
      }
    });
    (status_for(kind), Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn conflicts_share_one_status() {
    assert_eq!(status_for(ErrorKind::AlreadyMerged), StatusCode::CONFLICT);
    assert_eq!(status_for(ErrorKind::Conflict), StatusCode::CONFLICT);
  }

  #[test]
  fn transient_merge_failure_is_503_and_retryable() {
    let err = ApiError::from(unify_core::Error::MergeFailed("disk full".into()));
    assert_eq!(err.kind(), ErrorKind::MergeFailed);
    assert!(err.retryable());
    assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
  }

  #[test]
  fn not_found_is_not_retryable() {
    let err = ApiError::from(unify_core::Error::NotFound(Uuid::nil()));
    assert!(!err.retryable());
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
  }
}

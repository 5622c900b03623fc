//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failure of one curation run. The observation is dropped; writes that
/// already reached the broker stay there.
#[derive(Debug, Error)]
pub enum Error {
  /// The entity store or another upstream dependency failed.
  #[error("upstream unavailable: {0}")]
  Upstream(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error(transparent)]
  Core(#[from] salted_core::Error),

  #[error(transparent)]
  Quality(#[from] salted_quality::Error),
}

impl Error {
  pub fn upstream(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Upstream(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// An error returned by an ingest handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("curation failed: {0}")]
  Curation(#[from] Error),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Curation(e @ Error::Upstream(_)) => (StatusCode::BAD_GATEWAY, e.to_string()),
      ApiError::Curation(
        e @ (Error::Core(_) | Error::Quality(salted_quality::Error::InvalidSample(_))),
      ) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
      ApiError::Curation(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}

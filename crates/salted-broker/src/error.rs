//! Error type for `salted-broker`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The broker could not be reached or the request timed out.
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  /// The broker answered with a non-success status.
  #[error("broker returned {status} for {url}")]
  Status { status: u16, url: String },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

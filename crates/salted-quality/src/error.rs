//! Error types for `salted-quality`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A value or timestamp that cannot feed the model. The caller skips
  /// anomaly scoring for the sample; the model is left untouched.
  #[error("invalid sample: {0}")]
  InvalidSample(String),

  /// A snapshot or training file that cannot be read back. Fatal at startup.
  #[error("corrupt model file {}:{line}: {reason}", path.display())]
  ModelCorruption {
    path:   PathBuf,
    line:   usize,
    reason: String,
  },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<salted_core::Error> for Error {
  fn from(e: salted_core::Error) -> Self { Error::InvalidSample(e.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

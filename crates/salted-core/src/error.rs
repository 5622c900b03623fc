//! Error types for `salted-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("entity {entity} has no {attribute} attribute")]
  MissingAttribute {
    entity:    String,
    attribute: &'static str,
  },

  #[error("invalid timestamp: {0:?}")]
  InvalidTimestamp(String),

  #[error("attribute {attribute} of {entity} is not numeric: {found}")]
  InvalidValue {
    entity:    String,
    attribute: String,
    found:     String,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_errors_convert() {
    let e: Error = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(matches!(e, Error::Json(_)));
    assert!(e.to_string().starts_with("json error"));
  }
}

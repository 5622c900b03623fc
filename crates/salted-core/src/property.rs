//! Builders and readers for NGSI-LD attribute shapes.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use crate::time::format_timestamp;

pub fn property(value: impl Into<Value>) -> Value {
  json!({ "type": "Property", "value": value.into() })
}

pub fn observed_property(value: impl Into<Value>, at: DateTime<Utc>) -> Value {
  json!({
    "type":       "Property",
    "value":      value.into(),
    "observedAt": format_timestamp(at),
  })
}

pub fn relationship(object: &str) -> Value {
  json!({ "type": "Relationship", "object": object })
}

/// Read a number that may have been serialised as a JSON string.
///
/// `NaN` and infinities are not numbers here.
pub fn as_number(value: &Value) -> Option<f64> {
  let n = match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  };
  n.filter(|v| v.is_finite())
}

/// Read a boolean flag. Legacy quality records wrote `"True"` / `"False"`.
pub fn as_flag(value: &Value) -> Option<bool> {
  match value {
    Value::Bool(b) => Some(*b),
    Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
    Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
    _ => None,
  }
}

//! Timestamp parsing and formatting.
//!
//! Upstream collectors are not consistent about ISO-8601: some send RFC 3339
//! with an offset, some a naive `YYYY-MM-DDTHH:MM:SS`, and older snapshot
//! files use a space separator. Everything is normalised to UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result};

/// Output format for every timestamp the curator writes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

const NAIVE_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-8601 timestamp. Naive timestamps are taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
  let s = raw.trim();

  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  for fmt in OFFSET_FORMATS {
    if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
      return Ok(dt.with_timezone(&Utc));
    }
  }
  for fmt in NAIVE_FORMATS {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
      return Ok(naive.and_utc());
    }
  }

  Err(Error::InvalidTimestamp(raw.to_string()))
}

pub fn format_timestamp(dt: DateTime<Utc>) -> String {
  dt.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn parses_rfc3339_with_offset() {
    let dt = parse_timestamp("2023-05-20T09:42:45+02:00").unwrap();
    assert_eq!(dt, Utc.with_ymd_and_hms(2023, 5, 20, 7, 42, 45).unwrap());
  }

  #[test]
  fn parses_naive_and_space_separated() {
    let expected = Utc.with_ymd_and_hms(2023, 1, 1, 0, 5, 0).unwrap();
    assert_eq!(parse_timestamp("2023-01-01T00:05:00").unwrap(), expected);
    assert_eq!(parse_timestamp("2023-01-01 00:05:00").unwrap(), expected);
    assert_eq!(parse_timestamp("2023-01-01 00:05:00+00:00").unwrap(), expected);
  }

  #[test]
  fn rejects_garbage() {
    assert!(matches!(
      parse_timestamp("yesterday"),
      Err(Error::InvalidTimestamp(_))
    ));
  }

  #[test]
  fn formats_with_trailing_z() {
    let dt = Utc.with_ymd_and_hms(2022, 5, 20, 7, 42, 45).unwrap();
    assert_eq!(format_timestamp(dt), "2022-05-20T07:42:45Z");
  }
}

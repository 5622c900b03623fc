//! Plain-text persistence for detector windows.
//!
//! A snapshot is a semicolon-separated file with an optional `date;value`
//! header followed by one `timestamp;value` row per window point, oldest
//! first. New points are appended as they are produced; once the file has
//! grown past the window capacity it is rewritten from the live window
//! through a temporary file and an atomic rename.

use std::{
  fs::{self, File, OpenOptions},
  io::{BufRead, BufReader, Write},
  path::{Path, PathBuf},
};

use salted_core::time::{format_timestamp, parse_timestamp};

use crate::{Error, Result, detector::Sample};

const HEADER: &str = "date;value";

#[derive(Debug)]
pub struct SnapshotFile {
  path:     PathBuf,
  /// Rows currently on disk.
  rows:     usize,
}

impl SnapshotFile {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), rows: 0 } }

  pub fn path(&self) -> &Path { &self.path }

  pub fn rows(&self) -> usize { self.rows }

  /// Read every point in the file. A missing file is an empty window; a
  /// row that does not parse is [`Error::ModelCorruption`].
  pub fn load(&mut self) -> Result<Vec<Sample>> {
    if !self.path.exists() {
      self.rows = 0;
      return Ok(Vec::new());
    }
    let points = read_points(&self.path)?;
    self.rows = points.len();
    Ok(points)
  }

  /// Append one point, creating the file with a header if needed.
  pub fn append(&mut self, point: &Sample) -> Result<()> {
    let fresh = !self.path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
    if fresh {
      writeln!(file, "{HEADER}")?;
    }
    writeln!(file, "{};{}", format_timestamp(point.at), point.value)?;
    self.rows += 1;
    Ok(())
  }

  /// Replace the file contents with `points`.
  pub fn rewrite<'a>(&mut self, points: impl IntoIterator<Item = &'a Sample>) -> Result<()> {
    let tmp = self.path.with_extension("csv.tmp");
    let mut rows = 0;
    {
      let mut file = File::create(&tmp)?;
      writeln!(file, "{HEADER}")?;
      for point in points {
        writeln!(file, "{};{}", format_timestamp(point.at), point.value)?;
        rows += 1;
      }
      file.sync_all()?;
    }
    fs::rename(&tmp, &self.path)?;
    self.rows = rows;
    Ok(())
  }
}

/// Parse a `timestamp;value` file such as a snapshot or a training set.
pub fn read_points(path: &Path) -> Result<Vec<Sample>> {
  let reader = BufReader::new(File::open(path)?);
  let mut points = Vec::new();

  for (index, line) in reader.lines().enumerate() {
    let line = line?;
    let line = line.trim();
    if line.is_empty() || (index == 0 && line.eq_ignore_ascii_case(HEADER)) {
      continue;
    }
    let corrupt = |reason: String| Error::ModelCorruption {
      path: path.to_path_buf(),
      line: index + 1,
      reason,
    };

    let (at, value) = line
      .split_once(';')
      .ok_or_else(|| corrupt(format!("expected `date;value`, found {line:?}")))?;
    let at = parse_timestamp(at.trim()).map_err(|e| corrupt(e.to_string()))?;
    let value: f64 = value
      .trim()
      .parse()
      .map_err(|_| corrupt(format!("value {:?} is not a number", value.trim())))?;
    if !value.is_finite() {
      return Err(corrupt(format!("value {value} is not finite")));
    }
    points.push(Sample { at, value });
  }

  Ok(points)
}

#[cfg(test)]
mod tests {
  use chrono::{TimeDelta, TimeZone, Utc};

  use super::*;

  fn point(minutes: i64, value: f64) -> Sample {
    Sample {
      at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes),
      value,
    }
  }

  #[test]
  fn missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = SnapshotFile::new(dir.path().join("absent.csv"));
    assert!(file.load().unwrap().is_empty());
  }

  #[test]
  fn appended_points_load_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("series.csv");
    let mut file = SnapshotFile::new(&path);
    file.append(&point(0, 1.5)).unwrap();
    file.append(&point(5, 2.5)).unwrap();
    assert_eq!(file.rows(), 2);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("date;value\n2023-01-01T00:00:00Z;1.5\n"));

    let mut reopened = SnapshotFile::new(&path);
    assert_eq!(reopened.load().unwrap(), vec![point(0, 1.5), point(5, 2.5)]);
    assert_eq!(reopened.rows(), 2);
  }

  #[test]
  fn rewrite_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("series.csv");
    let mut file = SnapshotFile::new(&path);
    for i in 0..4 {
      file.append(&point(i * 5, i as f64)).unwrap();
    }
    let keep = [point(10, 2.0), point(15, 3.0)];
    file.rewrite(keep.iter()).unwrap();
    assert_eq!(file.rows(), 2);
    assert_eq!(file.load().unwrap(), keep.to_vec());
    assert!(!path.with_extension("csv.tmp").exists());
  }

  #[test]
  fn headerless_files_with_naive_dates_are_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("training.csv");
    fs::write(&path, "2023-01-01 00:00:00;20.1\n2023-01-01 00:05:00;20.3\n").unwrap();
    let points = read_points(&path).unwrap();
    assert_eq!(points, vec![point(0, 20.1), point(5, 20.3)]);
  }

  #[test]
  fn malformed_row_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(&path, "date;value\n2023-01-01T00:00:00Z;20\n2023-01-01T00:05:00Z;warm\n").unwrap();
    match read_points(&path) {
      Err(Error::ModelCorruption { line, .. }) => assert_eq!(line, 3),
      other => panic!("expected corruption, got {other:?}"),
    }
  }
}

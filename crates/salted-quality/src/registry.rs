//! Keyed collection of streaming detectors.
//!
//! Each model key owns one [`StreamingEwma`] and one [`SnapshotFile`]. The
//! registry is built once at startup by [`DetectorRegistry::load`] and then
//! owned by the pipeline; nothing here is global.

use std::{
  collections::{HashMap, hash_map::Entry},
  fs,
  path::{Path, PathBuf},
};

use chrono::{DateTime, TimeDelta, Utc};
use salted_core::entity::Entity;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::{
  Result,
  detector::{DetectorParams, Sample, StreamingEwma},
  snapshot::{SnapshotFile, read_points},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// How observations map onto models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelScope {
  /// One model per entity id.
  #[default]
  Series,
  /// One pooled model per entity type.
  EntityType,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub threshold:     f64,
  pub min_window:    usize,
  pub alpha:         f64,
  pub step_minutes:  i64,
  pub scope:         ModelScope,
  pub snapshot_dir:  PathBuf,
  pub training_file: Option<PathBuf>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    let params = DetectorParams::default();
    Self {
      threshold:     params.threshold,
      min_window:    params.min_window,
      alpha:         params.alpha,
      step_minutes:  params.step.num_minutes(),
      scope:         ModelScope::default(),
      snapshot_dir:  PathBuf::from("snapshots"),
      training_file: None,
    }
  }
}

impl DetectorConfig {
  pub fn params(&self) -> DetectorParams {
    DetectorParams {
      threshold:  self.threshold,
      min_window: self.min_window,
      alpha:      self.alpha,
      step:       TimeDelta::minutes(self.step_minutes),
    }
  }
}

/// Reduce a key to a file-name-safe stem.
///
/// Keys that need rewriting get a short SHA-256 suffix of the raw key, so
/// `urn:a` and `urn_a` never share a model or a snapshot file.
pub fn sanitize_key(raw: &str) -> String {
  let stem: String = raw
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
    .collect();
  if stem == raw {
    return stem;
  }
  let digest = Sha256::digest(raw.as_bytes());
  format!("{stem}-{}", hex::encode(&digest[..8]))
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Model {
  detector: StreamingEwma,
  snapshot: SnapshotFile,
}

#[derive(Debug)]
pub struct DetectorRegistry {
  params:       DetectorParams,
  scope:        ModelScope,
  snapshot_dir: PathBuf,
  training:     Vec<Sample>,
  models:       HashMap<String, Model>,
}

impl DetectorRegistry {
  /// Read the training set and every snapshot under `snapshot_dir`.
  ///
  /// Fails with [`crate::Error::ModelCorruption`] if any file is malformed.
  pub fn load(config: &DetectorConfig) -> Result<Self> {
    fs::create_dir_all(&config.snapshot_dir)?;

    let training = match &config.training_file {
      Some(path) => read_points(path)?,
      None => Vec::new(),
    };

    let mut registry = Self {
      params: config.params(),
      scope: config.scope,
      snapshot_dir: config.snapshot_dir.clone(),
      training,
      models: HashMap::new(),
    };

    for entry in fs::read_dir(&config.snapshot_dir)? {
      let path = entry?.path();
      if path.extension().and_then(|e| e.to_str()) != Some("csv") {
        continue;
      }
      let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
        continue;
      };
      let mut snapshot = SnapshotFile::new(&path);
      let points = snapshot.load()?;
      let mut detector = StreamingEwma::new(registry.params);
      detector.train(points);
      debug!(key, points = detector.window().len(), "restored detector");
      registry.models.insert(key, Model { detector, snapshot });
    }

    info!(
      models = registry.models.len(),
      training = registry.training.len(),
      dir = %registry.snapshot_dir.display(),
      "detector registry loaded"
    );
    Ok(registry)
  }

  pub fn params(&self) -> &DetectorParams { &self.params }

  pub fn scope(&self) -> ModelScope { self.scope }

  pub fn snapshot_dir(&self) -> &Path { &self.snapshot_dir }

  pub fn len(&self) -> usize { self.models.len() }

  pub fn is_empty(&self) -> bool { self.models.is_empty() }

  pub fn key_for(&self, entity: &Entity) -> String {
    match self.scope {
      ModelScope::Series => sanitize_key(&entity.id),
      ModelScope::EntityType => sanitize_key(entity.entity_type.as_str()),
    }
  }

  /// Human-readable description stored alongside outlier and synthetic tags.
  pub fn methodology(&self) -> String {
    format!(
      "streaming EWMA novelty detection (alpha {}, threshold {} std devs, {} minute steps, \
       minimum window {})",
      self.params.alpha,
      self.params.threshold,
      self.params.step.num_minutes(),
      self.params.min_window,
    )
  }

  /// Score one observation against its model and feed it back.
  ///
  /// An unparsable value or timestamp returns
  /// [`crate::Error::InvalidSample`] without touching any model.
  pub fn observe(&mut self, entity: &Entity) -> Result<bool> {
    let sample = Sample::from_entity(entity)?;
    let key = self.key_for(entity);
    let capacity = self.params.capacity();
    let model = self.model(&key)?;

    let outlier = model.detector.detect(sample);
    if let Some(point) = model.detector.update(sample, outlier) {
      model.snapshot.append(&point)?;
      if model.snapshot.rows() > capacity {
        model.snapshot.rewrite(model.detector.window())?;
        debug!(key, rows = model.snapshot.rows(), "compacted snapshot");
      }
    }
    Ok(outlier)
  }

  /// Expected value for the entity's series at `at`, or `None` while the
  /// model has no data at all.
  pub fn estimate(&mut self, entity: &Entity, at: DateTime<Utc>) -> Result<Option<f64>> {
    let key = self.key_for(entity);
    Ok(self.model(&key)?.detector.expected_value(at))
  }

  fn model(&mut self, key: &str) -> Result<&mut Model> {
    match self.models.entry(key.to_string()) {
      Entry::Occupied(slot) => Ok(slot.into_mut()),
      Entry::Vacant(slot) => {
        let mut detector = StreamingEwma::new(self.params);
        detector.train(self.training.iter().copied());
        let mut snapshot = SnapshotFile::new(self.snapshot_dir.join(format!("{key}.csv")));
        if detector.window().len() > 0 {
          snapshot.rewrite(detector.window())?;
        }
        debug!(key, seeded = detector.window().len(), "created detector");
        Ok(slot.insert(Model { detector, snapshot }))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use salted_core::{entity::EntityType, property::observed_property};

  use super::*;
  use crate::Error;

  fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
  }

  fn reading(id: &str, minutes: i64, value: f64) -> Entity {
    let mut e = Entity::new(id, EntityType::Temperature);
    e.set_attribute("value", observed_property(value, at(minutes)));
    e.set_attribute("dateObserved", observed_property(salted_core::time::format_timestamp(at(minutes)), at(minutes)));
    e
  }

  fn config(dir: &Path) -> DetectorConfig {
    DetectorConfig { snapshot_dir: dir.to_path_buf(), min_window: 2, ..DetectorConfig::default() }
  }

  #[test]
  fn keys_are_sanitized() {
    let key = sanitize_key("urn:ngsi-ld:Temperature:T1");
    let (stem, digest) = key.rsplit_once('-').unwrap();
    assert_eq!(stem, "urn_ngsi-ld_Temperature_T1");
    assert_eq!(digest.len(), 16);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(sanitize_key("Temperature"), "Temperature");
  }

  #[test]
  fn keys_differing_only_in_unsafe_characters_stay_apart() {
    assert_ne!(sanitize_key("urn:a"), sanitize_key("urn_a"));
    assert_ne!(sanitize_key("urn:a"), sanitize_key("urn/a"));
    assert_eq!(sanitize_key("urn:a"), sanitize_key("urn:a"));

    let dir = tempfile::tempdir().unwrap();
    let mut registry = DetectorRegistry::load(&config(dir.path())).unwrap();
    registry.observe(&reading("urn:a", 0, 20.0)).unwrap();
    registry.observe(&reading("urn_a", 0, 20.0)).unwrap();
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn series_scope_separates_models() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = DetectorRegistry::load(&config(dir.path())).unwrap();
    registry.observe(&reading("urn:ngsi-ld:Temperature:A", 0, 20.0)).unwrap();
    registry.observe(&reading("urn:ngsi-ld:Temperature:B", 0, 20.0)).unwrap();
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn type_scope_pools_models() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = DetectorConfig { scope: ModelScope::EntityType, ..config(dir.path()) };
    let mut registry = DetectorRegistry::load(&cfg).unwrap();
    registry.observe(&reading("urn:ngsi-ld:Temperature:A", 0, 20.0)).unwrap();
    registry.observe(&reading("urn:ngsi-ld:Temperature:B", 0, 20.0)).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.key_for(&reading("x", 0, 1.0)), "Temperature");
  }

  #[test]
  fn advances_persist_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let id = "urn:ngsi-ld:Temperature:A";
    {
      let mut registry = DetectorRegistry::load(&config(dir.path())).unwrap();
      for (minute, value) in [(0, 20.0), (6, 21.0), (12, 22.0)] {
        assert!(!registry.observe(&reading(id, minute, value)).unwrap());
      }
    }
    let mut registry = DetectorRegistry::load(&config(dir.path())).unwrap();
    assert_eq!(registry.len(), 1);
    // 20.0 and 21.0 average into the t+5 point, 22.0 lands at t+10.
    let expected = registry.estimate(&reading(id, 15, 0.0), at(15)).unwrap().unwrap();
    let want = (22.0 + 0.55 * 20.5) / 1.55;
    assert!((expected - want).abs() < 1e-9);
  }

  #[test]
  fn snapshot_is_compacted_past_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let id = "urn:ngsi-ld:Temperature:A";
    let mut registry = DetectorRegistry::load(&config(dir.path())).unwrap();
    for i in 0..20 {
      registry.observe(&reading(id, i * 6, 20.0)).unwrap();
    }
    let path = dir.path().join(format!("{}.csv", sanitize_key(id)));
    let rows = read_points(&path).unwrap();
    assert!(rows.len() <= registry.params().capacity());
  }

  #[test]
  fn training_seeds_new_models() {
    let dir = tempfile::tempdir().unwrap();
    let training = dir.path().join("training.txt");
    fs::write(&training, "date;value\n2023-01-01T00:00:00Z;18\n2023-01-01T00:05:00Z;19\n").unwrap();
    let snapshots = dir.path().join("snapshots");
    let cfg = DetectorConfig { training_file: Some(training), ..config(&snapshots) };
    let mut registry = DetectorRegistry::load(&cfg).unwrap();
    let e = reading("urn:ngsi-ld:Temperature:new", 10, 19.0);
    assert!(registry.estimate(&e, at(10)).unwrap().is_some());
    assert!(snapshots.join(format!("{}.csv", registry.key_for(&e))).exists());
  }

  #[test]
  fn corrupt_snapshot_fails_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bad.csv"), "date;value\nnot-a-date;1\n").unwrap();
    assert!(matches!(
      DetectorRegistry::load(&config(dir.path())),
      Err(Error::ModelCorruption { .. })
    ));
  }

  #[test]
  fn unparsable_value_leaves_models_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = DetectorRegistry::load(&config(dir.path())).unwrap();
    let mut e = reading("urn:ngsi-ld:Temperature:A", 0, 0.0);
    e.set_attribute("value", observed_property("warm", at(0)));
    assert!(matches!(registry.observe(&e), Err(Error::InvalidSample(_))));
    assert!(registry.is_empty());
  }
}

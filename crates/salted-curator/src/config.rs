//! Runtime configuration, deserialised from `curator.toml` and `SALTED__*`
//! environment variables.

use std::collections::BTreeMap;

use chrono::TimeDelta;
use salted_broker::{BrokerConfig, QueryLimits};
use salted_core::{geo::BoundingBox, quality::Provenance};
use salted_quality::registry::DetectorConfig;
use serde::Deserialize;

use crate::ground_truth::GroundTruthConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
  pub host:           String,
  pub port:           u16,
  pub broker:         BrokerConfig,
  pub assessment:     AssessmentConfig,
  /// Area inside which accuracy, outlier scoring and backfill apply.
  pub reference_area: BoundingBox,
  pub detector:       DetectorConfig,
  pub ground_truth:   GroundTruthConfig,
  /// Extra vocabulary variants per canonical attribute name.
  pub aliases:        BTreeMap<String, Vec<String>>,
}

impl Default for CuratorConfig {
  fn default() -> Self {
    Self {
      host:           "0.0.0.0".to_string(),
      port:           8080,
      broker:         BrokerConfig::default(),
      assessment:     AssessmentConfig::default(),
      reference_area: BoundingBox::default(),
      detector:       DetectorConfig::default(),
      ground_truth:   GroundTruthConfig::default(),
      aliases:        BTreeMap::new(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
  /// Lookback of temporal queries.
  pub time_window_minutes: i64,
  pub last_n:              usize,
  /// Radius of the sibling query used by precision.
  pub distance_range_m:    f64,
  pub source:              String,
  pub quality_context:     String,
}

impl Default for AssessmentConfig {
  fn default() -> Self {
    let provenance = Provenance::default();
    let limits = QueryLimits::default();
    Self {
      time_window_minutes: 60,
      last_n:              limits.last_n,
      distance_range_m:    limits.max_distance_m,
      source:              provenance.source,
      quality_context:     provenance.context,
    }
  }
}

impl AssessmentConfig {
  pub fn window(&self) -> TimeDelta { TimeDelta::minutes(self.time_window_minutes) }

  pub fn limits(&self) -> QueryLimits {
    QueryLimits { max_distance_m: self.distance_range_m, last_n: self.last_n }
  }

  pub fn provenance(&self) -> Provenance {
    Provenance { source: self.source.clone(), context: self.quality_context.clone() }
  }
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};
  use salted_quality::registry::ModelScope;

  use super::*;

  fn parse(toml: &str) -> CuratorConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_yields_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.broker.url, "http://localhost:9090");
    assert_eq!(cfg.assessment.time_window_minutes, 60);
    assert_eq!(cfg.assessment.limits(), QueryLimits { max_distance_m: 500.0, last_n: 100 });
    assert_eq!(cfg.detector.min_window, 96);
    assert_eq!(cfg.reference_area, BoundingBox::default());
    assert_eq!(cfg.ground_truth.stations.len(), 2);
  }

  #[test]
  fn sections_override_defaults() {
    let cfg = parse(
      r#"
      port = 9000

      [broker]
      url = "http://scorpio:9090"

      [assessment]
      time_window_minutes = 30

      [detector]
      scope = "entity_type"
      min_window = 12

      [aliases]
      value = ["https://smartdatamodels.org/dataModel.Weather/temperature"]
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.broker.url, "http://scorpio:9090");
    assert_eq!(cfg.broker.timeout_secs, 30);
    assert_eq!(cfg.assessment.window(), TimeDelta::minutes(30));
    assert_eq!(cfg.detector.scope, ModelScope::EntityType);
    assert_eq!(cfg.detector.min_window, 12);
    assert_eq!(cfg.detector.alpha, 0.45);
    assert_eq!(cfg.aliases["value"].len(), 1);
  }
}

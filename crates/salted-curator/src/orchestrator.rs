//! Per-observation quality assessment.
//!
//! | Entity type | Location             | Dimensions                                  | Processes          |
//! |-------------|----------------------|---------------------------------------------|--------------------|
//! | Temperature | inside reference area | accuracy, precision, timeliness, completeness | outlier, synthetic |
//! | Temperature | outside               | precision, timeliness, completeness           | none               |
//! | other       | any                   | timeliness, completeness                      | none               |

use salted_core::{
  entity::{Entity, EntityType},
  geo::BoundingBox,
  quality::{OutlierTag, QualityRecord, SyntheticTag, quality_id_for},
  store::EntityStore,
};
use tracing::{debug, warn};

use crate::{
  Result,
  dimensions::{self, Prior},
  ground_truth::GroundTruth,
  pipeline::Curator,
};

/// Methodology recorded on the outlier tag of a synthetic observation.
const NOT_SCORED: &str = "not scored: synthetic value";

/// Which dimensions and processes apply to an observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Plan {
  pub accuracy:     bool,
  pub precision:    bool,
  pub timeliness:   bool,
  pub completeness: bool,
  pub outlier:      bool,
  pub synthetic:    bool,
}

impl Plan {
  pub fn select(observation: &Entity, reference_area: &BoundingBox) -> Self {
    let inside = observation
      .coordinates()
      .is_some_and(|c| reference_area.contains(&c));
    match (&observation.entity_type, inside) {
      (EntityType::Temperature, true) => Self {
        accuracy:     true,
        precision:    true,
        timeliness:   true,
        completeness: true,
        outlier:      true,
        synthetic:    true,
      },
      (EntityType::Temperature, false) => Self {
        precision: true,
        timeliness: true,
        completeness: true,
        ..Self::default()
      },
      _ => Self { timeliness: true, completeness: true, ..Self::default() },
    }
  }

  /// Series that get outlier scoring also get gap backfill.
  pub fn backfills(&self) -> bool { self.synthetic }
}

/// The quality record for one observation and, for a synthetic observation,
/// the value that replaces its measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
  pub record:      QualityRecord,
  pub substituted: Option<f64>,
}

impl<S, G> Curator<S, G>
where
  S: EntityStore,
  G: GroundTruth,
{
  /// Score `observation`. Nothing is written to the broker.
  ///
  /// A broker failure aborts the whole assessment. An unreadable value only
  /// skips the dimensions that need it. The outlier detector is fed last, so
  /// a failed broker read leaves it untouched.
  pub async fn assess(&mut self, observation: &Entity, is_synthetic: bool) -> Result<Assessment> {
    let plan = Plan::select(observation, &self.settings.reference_area);
    let at = observation.timestamp()?;
    let quality_id = observation
      .quality_id()
      .map(str::to_string)
      .unwrap_or_else(|| quality_id_for(&observation.id));
    let mut record = QualityRecord::new(quality_id, at);

    let mut substituted = None;
    if plan.synthetic {
      if is_synthetic {
        substituted = self.detectors.estimate(observation, at)?;
      }
      record.synthetic = Some(SyntheticTag {
        is_synthetic,
        estimated_value: substituted,
        methodology: self.detectors.methodology(),
      });
    }

    let mut working = observation.clone();
    if let Some(estimate) = substituted {
      working.set_numeric_value(estimate);
    }
    let value = match working.numeric_value() {
      Ok(value) => Some(value),
      Err(e) => {
        warn!(id = %observation.id, error = %e, "value unreadable, skipping value dimensions");
        None
      }
    };

    if let (true, Some(value)) = (plan.accuracy, value) {
      record.accuracy = Some(dimensions::accuracy(&self.ground_truth, &working, at, value).await);
    }
    if let (true, Some(value)) = (plan.precision, value) {
      record.precision = Some(dimensions::precision(self.store.as_ref(), &working, value).await?);
    }
    if plan.timeliness || plan.completeness {
      let since = at - self.settings.window;
      let prior = Prior::load(self.store.as_ref(), &working, Some(since)).await?;
      if plan.timeliness {
        record.timeliness = Some(dimensions::timeliness(&prior, &working)?);
      }
      if plan.completeness {
        record.completeness = Some(dimensions::completeness(
          &prior,
          is_synthetic,
          self.settings.window_minutes(),
        ));
      }
    }

    if plan.outlier {
      record.outlier = self.score_outlier(observation, is_synthetic)?;
    }

    debug!(id = %observation.id, is_synthetic, ?plan, ?record, "assessed");
    Ok(Assessment { record, substituted })
  }

  fn score_outlier(&mut self, observation: &Entity, is_synthetic: bool) -> Result<Option<OutlierTag>> {
    if is_synthetic {
      return Ok(Some(OutlierTag { is_outlier: false, methodology: NOT_SCORED.to_string() }));
    }
    match self.detectors.observe(observation) {
      Ok(is_outlier) => Ok(Some(OutlierTag { is_outlier, methodology: self.detectors.methodology() })),
      Err(salted_quality::Error::InvalidSample(reason)) => {
        warn!(id = %observation.id, %reason, "outlier scoring skipped");
        Ok(None)
      }
      Err(e) => Err(e.into()),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn at(lon: f64, lat: f64, entity_type: EntityType) -> Entity {
    let mut e = Entity::new("urn:ngsi-ld:x:1", entity_type);
    e.set_attribute(
      "location",
      json!({ "type": "GeoProperty", "value": { "type": "Point", "coordinates": [lon, lat] } }),
    );
    e
  }

  #[test]
  fn temperature_inside_area_gets_everything() {
    let plan = Plan::select(&at(-3.80, 43.46, EntityType::Temperature), &BoundingBox::default());
    assert!(plan.accuracy && plan.precision && plan.timeliness && plan.completeness);
    assert!(plan.outlier && plan.synthetic && plan.backfills());
  }

  #[test]
  fn temperature_outside_area_skips_accuracy_and_processes() {
    let plan = Plan::select(&at(-3.60, 43.46, EntityType::Temperature), &BoundingBox::default());
    assert_eq!(plan, Plan {
      precision: true,
      timeliness: true,
      completeness: true,
      ..Plan::default()
    });
  }

  #[test]
  fn other_types_get_timeliness_and_completeness() {
    for ty in [EntityType::TrafficFlowObserved, EntityType::AirQualityObserved] {
      let plan = Plan::select(&at(-3.80, 43.46, ty), &BoundingBox::default());
      assert_eq!(plan, Plan { timeliness: true, completeness: true, ..Plan::default() });
    }
  }

  #[test]
  fn temperature_without_location_is_outside() {
    let plan = Plan::select(&Entity::new("urn:t", EntityType::Temperature), &BoundingBox::default());
    assert!(!plan.accuracy && !plan.backfills());
  }
}

//! Quality dimensions computed against the broker's view of a series.
//!
//! [`Prior`] gathers what the broker knows about an observation's series
//! (current entity, current quality record, recent quality history) and the
//! functions below turn it into scores using the formulas in
//! [`salted_quality::dimensions`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use salted_core::{
  entity::{Entity, EntityType},
  property::as_number,
  quality::{Accuracy, outlier_flag, quality_id_for, synthetic_flag},
  store::{EntityStore, TemporalEntity, observed_at},
};
use salted_quality::dimensions::{
  self as formula, DEFAULT_TIMELINESS, blend_timeliness, completeness_received,
  completeness_synthetic, gap_count, interval_minutes,
};
use tracing::debug;

use crate::{Error, Result, ground_truth::GroundTruth};

// ─── Prior state ─────────────────────────────────────────────────────────────

/// The broker's state for an observation's series before it is written.
#[derive(Debug, Clone, Default)]
pub struct Prior {
  /// Latest stored observation of the series.
  pub entity:  Option<Entity>,
  /// Current quality record of the series.
  pub quality: Option<Entity>,
  /// Quality record history within the lookback window.
  pub history: TemporalEntity,
}

impl Prior {
  /// Fetch the series state. History is only queried when `since` is given
  /// and the series already exists.
  pub async fn load<S: EntityStore>(
    store: &S,
    observation: &Entity,
    since: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    let entity = store
      .get_by_id(&observation.id, &observation.entity_type)
      .await
      .map_err(Error::upstream)?;
    if entity.is_none() {
      return Ok(Self::default());
    }

    let quality_id = observation
      .quality_id()
      .map(str::to_string)
      .unwrap_or_else(|| quality_id_for(&observation.id));
    let quality = store
      .get_by_id(&quality_id, &EntityType::DataQualityAssessment)
      .await
      .map_err(Error::upstream)?;
    let history = match since {
      Some(since) => store
        .get_temporal_by_id(&quality_id, &EntityType::DataQualityAssessment, since)
        .await
        .map_err(Error::upstream)?,
      None => TemporalEntity::default(),
    };

    Ok(Self { entity, quality, history })
  }

  /// Last known timeliness of the series, if it has a quality record.
  fn last_timeliness(&self) -> Option<f64> {
    self.quality.as_ref()?.number("timeliness").ok().flatten()
  }
}

// ─── Gap ─────────────────────────────────────────────────────────────────────

/// Missing observations before the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Gap {
  pub count:    u32,
  /// Last known reporting interval in minutes.
  pub interval: f64,
}

/// Requires both a stored observation and a quality record; otherwise there
/// is no gap.
pub fn gap(prior: &Prior, observation: &Entity) -> Result<Gap> {
  let (Some(previous), Some(last)) = (&prior.entity, prior.last_timeliness()) else {
    return Ok(Gap::default());
  };
  let input = interval_minutes(observation.timestamp()?, previous.timestamp()?);
  let count = gap_count(input, last);
  debug!(id = %observation.id, input, last, count, "gap");
  Ok(Gap { count, interval: last })
}

// ─── Accuracy ────────────────────────────────────────────────────────────────

pub async fn accuracy<G: GroundTruth>(
  ground_truth: &G,
  observation: &Entity,
  measured_at: DateTime<Utc>,
  value: f64,
) -> Accuracy {
  let Some(at) = observation.coordinates() else {
    return Accuracy::NotApplicable;
  };
  let reference = ground_truth
    .reference_value(&observation.entity_type, measured_at, at)
    .await;
  debug!(id = %observation.id, ?reference, "accuracy");
  match reference {
    Some(truth) => Accuracy::Measured(formula::accuracy(value, truth)),
    None => Accuracy::NotApplicable,
  }
}

// ─── Precision ───────────────────────────────────────────────────────────────

/// Spread of `value` against nearby siblings of the same type.
///
/// Siblings whose quality record marks them as outliers are left out. A
/// sibling with no quality record is trusted.
pub async fn precision<S: EntityStore>(store: &S, observation: &Entity, value: f64) -> Result<f64> {
  let Some(at) = observation.coordinates() else {
    return Ok(0.0);
  };
  let siblings = store
    .get_by_type_near(&observation.entity_type, at)
    .await
    .map_err(Error::upstream)?;

  let quality_ids: Vec<String> = siblings
    .iter()
    .filter_map(|s| s.quality_id().map(str::to_string))
    .collect();
  let records = if quality_ids.is_empty() {
    Vec::new()
  } else {
    store
      .get_many(&quality_ids, &EntityType::DataQualityAssessment)
      .await
      .map_err(Error::upstream)?
  };
  let outliers: HashMap<&str, bool> = records
    .iter()
    .filter_map(|q| Some((q.id.as_str(), outlier_flag(q.attribute("outlier")?)?)))
    .collect();

  let inliers: Vec<f64> = siblings
    .iter()
    .filter(|s| s.quality_id().and_then(|q| outliers.get(q)) != Some(&true))
    .filter_map(|s| s.numeric_value().ok())
    .collect();
  let score = formula::precision(value, &inliers);
  debug!(id = %observation.id, siblings = siblings.len(), inliers = inliers.len(), score, "precision");
  Ok(score)
}

// ─── Completeness ────────────────────────────────────────────────────────────

pub fn completeness(prior: &Prior, is_synthetic: bool, window_minutes: f64) -> f64 {
  let Some(previous) = &prior.entity else {
    return 1.0;
  };
  if previous.quality_id().is_none() {
    return 1.0;
  }
  let history = &prior.history;
  if !history.has("completeness") {
    return 0.0;
  }

  let received = history.count("completeness");
  if history.has("synthetic") {
    let synthetic = history
      .instances("synthetic")
      .into_iter()
      .filter(|i| synthetic_flag(i) == Some(true))
      .count();
    completeness_synthetic(received, synthetic, is_synthetic)
  } else {
    let last_interval = history
      .instances("timeliness")
      .first()
      .and_then(|i| i.get("value"))
      .and_then(as_number);
    match last_interval {
      Some(interval) => completeness_received(window_minutes, interval, received),
      None => 1.0,
    }
  }
}

// ─── Timeliness ──────────────────────────────────────────────────────────────

/// Running reporting interval of the series in minutes.
///
/// For series with synthetic backfill the interval is measured from the
/// newest real observation, not from the last synthetic one.
pub fn timeliness(prior: &Prior, observation: &Entity) -> Result<f64> {
  let (Some(previous), Some(quality)) = (&prior.entity, &prior.quality) else {
    return Ok(DEFAULT_TIMELINESS);
  };

  let mut last_seen = previous.timestamp()?;
  if quality.has_attribute("synthetic")
    && let Some(real) = prior
      .history
      .instances("synthetic")
      .into_iter()
      .find(|i| synthetic_flag(i) == Some(false))
      .and_then(observed_at)
  {
    last_seen = real;
  }

  let interval = interval_minutes(observation.timestamp()?, last_seen);
  let previous_timeliness = prior.last_timeliness().unwrap_or(DEFAULT_TIMELINESS);
  let score = blend_timeliness(previous_timeliness, interval);
  debug!(id = %observation.id, interval, previous_timeliness, score, "timeliness");
  Ok(score)
}

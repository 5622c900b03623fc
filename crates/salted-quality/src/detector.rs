//! Streaming EWMA novelty detector.
//!
//! The model keeps a bounded window of accepted values at a fixed time
//! resolution (one point per `step`). Raw samples are compared against the
//! exponentially weighted mean of that window; inliers are queued and folded
//! into a single averaged point each time the model advances by one step, so
//! the reporting frequency of a sensor does not change the model's horizon.
//!
//! ```text
//! Uninitialized ──first sample──▶ Warming ──window ≥ min_window──▶ Active
//! ```
//!
//! While warming the detector never reports an outlier.

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use salted_core::entity::Entity;

use crate::{Error, Result};

// ─── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
  /// Deviation multiplier: a sample is an outlier beyond `expected ± σ·threshold`.
  pub threshold:  f64,
  /// Window size below which the detector is still warming up.
  pub min_window: usize,
  /// Smoothing factor of the EWMA, in `(0, 1]`.
  pub alpha:      f64,
  /// Time resolution of the window.
  pub step:       TimeDelta,
}

impl Default for DetectorParams {
  fn default() -> Self {
    Self {
      threshold:  3.0,
      min_window: 96,
      alpha:      0.45,
      step:       TimeDelta::minutes(5),
    }
  }
}

impl DetectorParams {
  /// The window never holds more than three times its minimum size.
  pub fn capacity(&self) -> usize { self.min_window.saturating_mul(3).max(1) }
}

// ─── Samples ─────────────────────────────────────────────────────────────────

/// A timestamped numeric reading, validated before it may touch a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
  pub at:    DateTime<Utc>,
  pub value: f64,
}

impl Sample {
  pub fn new(at: DateTime<Utc>, value: f64) -> Result<Self> {
    if !value.is_finite() {
      return Err(Error::InvalidSample(format!("non-finite value {value}")));
    }
    Ok(Self { at, value })
  }

  /// Read the sample from an observation's `value` attribute. The time is
  /// `value.observedAt` when present, else the observation date.
  pub fn from_entity(entity: &Entity) -> Result<Self> {
    let value = entity.numeric_value()?;
    let at = match entity
      .attribute("value")
      .and_then(|v| v.get("observedAt"))
      .and_then(|v| v.as_str())
    {
      Some(raw) => salted_core::time::parse_timestamp(raw)?,
      None => entity.timestamp()?,
    };
    Self::new(at, value)
  }
}

// ─── Detector ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
  Uninitialized,
  Warming,
  Active,
}

#[derive(Debug, Clone)]
pub struct StreamingEwma {
  params:       DetectorParams,
  window:       VecDeque<Sample>,
  /// Inliers received since the last advance.
  pending:      Vec<f64>,
  last_advance: Option<DateTime<Utc>>,
}

impl StreamingEwma {
  pub fn new(params: DetectorParams) -> Self {
    Self {
      params,
      window: VecDeque::with_capacity(params.capacity()),
      pending: Vec::new(),
      last_advance: None,
    }
  }

  pub fn params(&self) -> &DetectorParams { &self.params }

  pub fn state(&self) -> DetectorState {
    match self.last_advance {
      None => DetectorState::Uninitialized,
      Some(_) if self.window.len() < self.params.min_window => DetectorState::Warming,
      Some(_) => DetectorState::Active,
    }
  }

  pub fn window(&self) -> impl ExactSizeIterator<Item = &Sample> { self.window.iter() }

  pub fn last_advance(&self) -> Option<DateTime<Utc>> { self.last_advance }

  /// Replace the window with historical points, oldest first.
  pub fn train(&mut self, points: impl IntoIterator<Item = Sample>) {
    for point in points {
      self.last_advance = Some(point.at);
      self.push(point);
    }
  }

  /// Is `sample` outside `expected ± σ·threshold`?
  ///
  /// Does not modify the window; feed the sample back through
  /// [`StreamingEwma::update`] afterwards.
  pub fn detect(&mut self, sample: Sample) -> bool {
    if self.last_advance.is_none() {
      self.last_advance = Some(sample.at);
    }
    self.evict();

    if self.state() != DetectorState::Active {
      return false;
    }
    let Some(expected) = self.expected_value(sample.at) else {
      return false;
    };
    let deviation = self.std_dev() * self.params.threshold;
    sample.value > expected + deviation || sample.value < expected - deviation
  }

  /// EWMA over the window with the most recent point weighted highest.
  ///
  /// Uses the bias-adjusted form: weights `(1 − α)^k` for the point `k` steps
  /// back, normalised by their sum. `None` while the window is empty.
  pub fn expected_value(&self, _at: DateTime<Utc>) -> Option<f64> {
    if self.window.is_empty() {
      return None;
    }
    let decay = 1.0 - self.params.alpha;
    let (mut weighted, mut total, mut weight) = (0.0, 0.0, 1.0);
    for point in self.window.iter().rev() {
      weighted += weight * point.value;
      total += weight;
      weight *= decay;
    }
    Some(weighted / total)
  }

  /// Population standard deviation of the window.
  pub fn std_dev(&self) -> f64 {
    let n = self.window.len();
    if n == 0 {
      return 0.0;
    }
    let mean = self.window.iter().map(|p| p.value).sum::<f64>() / n as f64;
    let var = self.window.iter().map(|p| (p.value - mean).powi(2)).sum::<f64>() / n as f64;
    var.sqrt()
  }

  /// Queue an inlier and advance the model if a step has elapsed.
  ///
  /// Returns the averaged point appended to the window, if any, so the caller
  /// can persist it. The model advances by exactly one step per call.
  pub fn update(&mut self, sample: Sample, was_outlier: bool) -> Option<Sample> {
    if !was_outlier {
      self.pending.push(sample.value);
    }

    let Some(last) = self.last_advance else {
      self.last_advance = Some(sample.at);
      return None;
    };
    if sample.at - last <= self.params.step {
      return None;
    }

    let advanced = last + self.params.step;
    self.last_advance = Some(advanced);
    if self.pending.is_empty() {
      return None;
    }

    let mean = self.pending.iter().sum::<f64>() / self.pending.len() as f64;
    self.pending.clear();
    let point = Sample { at: advanced, value: mean };
    self.push(point);
    Some(point)
  }

  fn push(&mut self, point: Sample) {
    self.window.push_back(point);
    self.evict();
  }

  fn evict(&mut self) {
    while self.window.len() > self.params.capacity() {
      self.window.pop_front();
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
  }

  fn s(minutes: i64, value: f64) -> Sample { Sample::new(t(minutes), value).unwrap() }

  fn params(min_window: usize) -> DetectorParams {
    DetectorParams { min_window, ..DetectorParams::default() }
  }

  fn trained(values: &[f64], min_window: usize) -> StreamingEwma {
    let mut d = StreamingEwma::new(params(min_window));
    d.train(values.iter().enumerate().map(|(i, v)| s(i as i64 * 5, *v)));
    d
  }

  #[test]
  fn states_progress() {
    let mut d = StreamingEwma::new(params(3));
    assert_eq!(d.state(), DetectorState::Uninitialized);
    d.detect(s(0, 1.0));
    assert_eq!(d.state(), DetectorState::Warming);
    d.train([s(5, 1.0), s(10, 1.0), s(15, 1.0)]);
    assert_eq!(d.state(), DetectorState::Active);
  }

  #[test]
  fn cold_start_never_flags() {
    let mut d = trained(&[20.0, 20.5, 19.5], 96);
    for v in [1e9, -1e9, 0.0, 20.0] {
      assert!(!d.detect(s(20, v)));
    }
  }

  #[test]
  fn flags_values_outside_band_once_active() {
    let values: Vec<f64> = (0..10).map(|i| 20.0 + if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
    let mut d = trained(&values, 5);
    assert!(!d.detect(s(60, 20.4)));
    assert!(d.detect(s(60, 30.0)));
    assert!(d.detect(s(60, 10.0)));
  }

  #[test]
  fn ewma_weights_recent_points_highest() {
    let d = trained(&[0.0, 10.0], 1);
    // weights: 1 for 10.0, 0.55 for 0.0
    let expected = 10.0 / 1.55;
    assert!((d.expected_value(t(10)).unwrap() - expected).abs() < 1e-12);
  }

  #[test]
  fn expected_value_of_empty_window_is_none() {
    let d = StreamingEwma::new(params(3));
    assert_eq!(d.expected_value(t(0)), None);
  }

  #[test]
  fn window_is_capped_at_three_times_minimum() {
    let values: Vec<f64> = (0..20).map(f64::from).collect();
    let d = trained(&values, 2);
    let kept: Vec<f64> = d.window().map(|p| p.value).collect();
    assert_eq!(kept, vec![14.0, 15.0, 16.0, 17.0, 18.0, 19.0]);
  }

  #[test]
  fn update_averages_queue_once_step_elapses() {
    let mut d = StreamingEwma::new(params(3));
    assert_eq!(d.update(s(0, 10.0), false), None);
    assert_eq!(d.update(s(2, 20.0), false), None);
    assert_eq!(d.update(s(4, 99.0), true), None);
    let advanced = d.update(s(6, 30.0), false).unwrap();
    assert_eq!(advanced.at, t(5));
    assert_eq!(advanced.value, 20.0);
    assert_eq!(d.window().len(), 1);
    assert_eq!(d.last_advance(), Some(t(5)));
  }

  #[test]
  fn exactly_one_step_is_not_enough() {
    let mut d = StreamingEwma::new(params(3));
    d.update(s(0, 1.0), false);
    assert_eq!(d.update(s(5, 1.0), false), None);
  }

  #[test]
  fn outliers_only_advance_the_clock() {
    let mut d = StreamingEwma::new(params(3));
    d.update(s(0, 1.0), true);
    assert_eq!(d.update(s(7, 50.0), true), None);
    assert_eq!(d.last_advance(), Some(t(5)));
    assert_eq!(d.window().len(), 0);
  }

  #[test]
  fn non_finite_samples_are_rejected() {
    assert!(matches!(Sample::new(t(0), f64::NAN), Err(Error::InvalidSample(_))));
    assert!(Sample::new(t(0), f64::INFINITY).is_err());
  }
}

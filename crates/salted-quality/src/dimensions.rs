//! Arithmetic behind each quality dimension.
//!
//! These functions take already-fetched inputs; reading prior state from the
//! entity store is the curator's job.

use chrono::{DateTime, Utc};
use salted_core::geo::Coordinates;

/// Timeliness reported for a series with no prior record.
pub const DEFAULT_TIMELINESS: f64 = 10.0;

/// Gaps at or above this are treated as a break in the series, not backfilled.
pub const UNRECOVERABLE_GAP: u32 = 10;

/// An input interval must exceed this multiple of the last known interval to
/// count as a gap.
pub const GAP_TRIGGER: f64 = 2.5;

/// Timeliness is only re-blended when the new interval exceeds this many
/// minutes.
pub const MIN_TIMELINESS_GAP: f64 = 0.5;

/// Share of the new interval in the blended timeliness.
pub const TIMELINESS_WEIGHT: f64 = 0.8;

pub fn round_to(value: f64, decimals: i32) -> f64 {
  let factor = 10f64.powi(decimals);
  (value * factor).round() / factor
}

/// Minutes between two observation times, to 2 decimals.
pub fn interval_minutes(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
  round_to((later - earlier).num_milliseconds() as f64 / 60_000.0, 2)
}

// ─── Gap ─────────────────────────────────────────────────────────────────────

/// Number of observations missing between the previous one and this one.
///
/// `round(input / last) − 1` when `input > 2.5 × last`, otherwise 0.
pub fn gap_count(input_interval: f64, last_interval: f64) -> u32 {
  if last_interval.is_nan() || last_interval <= 0.0 || !input_interval.is_finite() {
    return 0;
  }
  if input_interval <= GAP_TRIGGER * last_interval {
    return 0;
  }
  let ratio = (input_interval / last_interval).round();
  if ratio >= u32::MAX as f64 { u32::MAX } else { (ratio as u32).saturating_sub(1) }
}

// ─── Accuracy ────────────────────────────────────────────────────────────────

/// One reference station's reading and its distance to the observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationReading {
  pub value:       f64,
  pub distance_km: f64,
}

impl StationReading {
  pub fn at(value: f64, station: &Coordinates, observation: &Coordinates) -> Self {
    Self { value, distance_km: station.distance_km(observation) }
  }
}

/// Inverse-distance blend of two station readings, to 2 decimals.
///
/// Station A weighs `1 − dA / (dA + dB)`. A missing station falls back to the
/// other's raw value.
pub fn blend_reference(a: Option<StationReading>, b: Option<StationReading>) -> Option<f64> {
  match (a, b) {
    (Some(a), Some(b)) => {
      let total = a.distance_km + b.distance_km;
      let weight_a = if total > 0.0 { 1.0 - a.distance_km / total } else { 0.5 };
      Some(round_to(weight_a * a.value + (1.0 - weight_a) * b.value, 2))
    }
    (Some(only), None) | (None, Some(only)) => Some(only.value),
    (None, None) => None,
  }
}

/// Absolute difference from the ground truth, to 2 decimals.
pub fn accuracy(observed: f64, ground_truth: f64) -> f64 { round_to((observed - ground_truth).abs(), 2) }

// ─── Precision ───────────────────────────────────────────────────────────────

/// `‖x − v‖₂ / √n` over the inlier sibling values, or 0 with no inliers.
pub fn precision(value: f64, inliers: &[f64]) -> f64 {
  if inliers.is_empty() {
    return 0.0;
  }
  let sum_sq: f64 = inliers.iter().map(|v| (value - v).powi(2)).sum();
  sum_sq.sqrt() / (inliers.len() as f64).sqrt()
}

// ─── Completeness ────────────────────────────────────────────────────────────

/// Completeness for series that receive synthetic backfill.
///
/// `prior` is the number of completeness instances in the lookback window and
/// `prior_synthetic` how many of those were synthetic; the current sample is
/// counted on top of both.
pub fn completeness_synthetic(prior: usize, prior_synthetic: usize, is_synthetic: bool) -> f64 {
  let total = prior + 1;
  let synthetic = (prior_synthetic + usize::from(is_synthetic)).min(total);
  round_to((total - synthetic) as f64 / total as f64, 3)
}

/// Completeness for series without backfill: received over expected, capped
/// at 1. `prior` excludes the current sample.
pub fn completeness_received(window_minutes: f64, last_interval: f64, prior: usize) -> f64 {
  if last_interval.is_nan() || last_interval <= 0.0 {
    return 1.0;
  }
  let expected = (window_minutes / last_interval).ceil();
  if expected < 1.0 {
    return 1.0;
  }
  round_to((prior + 1) as f64 / expected, 3).min(1.0)
}

// ─── Timeliness ──────────────────────────────────────────────────────────────

/// Blend the newest interval into the running timeliness.
///
/// The previous value is kept when the interval is at or below half a minute.
pub fn blend_timeliness(previous: f64, interval: f64) -> f64 {
  if interval > MIN_TIMELINESS_GAP {
    TIMELINESS_WEIGHT * interval + (1.0 - TIMELINESS_WEIGHT) * previous
  } else {
    previous
  }
}

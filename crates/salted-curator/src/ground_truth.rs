//! Reference readings used by the accuracy dimension.
//!
//! [`ReferenceStations`] pulls the hourly CSV published for each of two
//! weather stations, caches it on disk, and blends the two latest readings by
//! distance to the observation. Any failure degrades to the other station or
//! to no reference at all; it never aborts an assessment.

use std::{
  collections::BTreeMap,
  future::Future,
  path::{Path, PathBuf},
  time::Duration,
};

use chrono::{DateTime, Timelike, Utc};
use reqwest::Client;
use salted_core::{entity::EntityType, geo::Coordinates};
use salted_quality::dimensions::{StationReading, blend_reference};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Source of ground-truth values for an observation.
pub trait GroundTruth: Send + Sync {
  /// The reference value for a measurement of `entity_type` made at `at`,
  /// or `None` when no reference is available.
  fn reference_value<'a>(
    &'a self,
    entity_type: &'a EntityType,
    observed_at: DateTime<Utc>,
    at: Coordinates,
  ) -> impl Future<Output = Option<f64>> + Send + 'a;
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct StationConfig {
  pub name:      String,
  pub url:       String,
  pub latitude:  f64,
  pub longitude: f64,
}

impl StationConfig {
  pub fn coordinates(&self) -> Coordinates { Coordinates::new(self.longitude, self.latitude) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroundTruthConfig {
  pub cache_dir:    PathBuf,
  pub timeout_secs: u64,
  /// The first two entries are blended.
  pub stations:     Vec<StationConfig>,
  /// Entity type → CSV column holding its measurement.
  pub measurements: BTreeMap<String, usize>,
}

impl Default for GroundTruthConfig {
  fn default() -> Self {
    let aemet = |code: &str| {
      format!(
        "https://www.aemet.es/es/eltiempo/observacion/ultimosdatos_{code}_datos-horarios.csv\
         ?k=can&l={code}&datos=det&w=0&f=temperatura&x=h24"
      )
    };
    Self {
      cache_dir:    PathBuf::from("ground_truth"),
      timeout_secs: 30,
      stations:     vec![
        StationConfig {
          name:      "1111X".to_string(),
          url:       aemet("1111X"),
          latitude:  43.4914,
          longitude: -3.8006,
        },
        StationConfig {
          name:      "1109X".to_string(),
          url:       aemet("1109X"),
          latitude:  43.4289,
          longitude: -3.8297,
        },
      ],
      measurements: BTreeMap::from([
        ("Temperature".to_string(), 1),
        ("RelativeHumidity".to_string(), 9),
      ]),
    }
  }
}

// ─── Station files ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
enum StationError {
  #[error("fetch failed: {0}")]
  Fetch(#[from] reqwest::Error),

  #[error("station answered {0}")]
  Status(u16),

  #[error("cache io: {0}")]
  Io(#[from] std::io::Error),

  #[error("no reading in row 4, column {0}")]
  Parse(usize),
}

/// Row of the station CSV holding the latest hourly reading.
const READING_ROW: usize = 4;

/// Decode ISO-8859-1 text.
pub fn decode_latin1(bytes: &[u8]) -> String { bytes.iter().map(|&b| char::from(b)).collect() }

/// The latest reading in a station CSV: row 4, `column`, quotes stripped.
pub fn parse_reading(text: &str, column: usize) -> Option<f64> {
  text
    .lines()
    .nth(READING_ROW)?
    .split(',')
    .nth(column)?
    .trim()
    .trim_matches('"')
    .trim()
    .parse()
    .ok()
}

/// A cached file is refreshed at most once per hour, from half past onward,
/// when it was written in an earlier hour than the observation's.
pub fn refresh_due(written: DateTime<Utc>, observed_at: DateTime<Utc>) -> bool {
  let hour = |t: DateTime<Utc>| (t.date_naive(), t.hour());
  observed_at.minute() >= 30 && hour(written) < hour(observed_at)
}

// ─── ReferenceStations ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReferenceStations {
  client: Client,
  config: GroundTruthConfig,
}

impl ReferenceStations {
  pub fn new(config: GroundTruthConfig) -> reqwest::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { client, config })
  }

  fn cache_path(&self, station: &StationConfig) -> PathBuf {
    self.config.cache_dir.join(format!("{}.csv", station.name))
  }

  fn column_for(&self, entity_type: &EntityType) -> Option<usize> {
    self
      .config
      .measurements
      .iter()
      .find(|(name, _)| name.eq_ignore_ascii_case(entity_type.as_str()))
      .map(|(_, column)| *column)
  }

  async fn download(&self, station: &StationConfig, path: &Path) -> Result<(), StationError> {
    let response = self.client.get(&station.url).send().await?;
    if !response.status().is_success() {
      return Err(StationError::Status(response.status().as_u16()));
    }
    let body = response.bytes().await?;
    tokio::fs::create_dir_all(&self.config.cache_dir).await?;
    tokio::fs::write(path, &body).await?;
    debug!(station = %station.name, bytes = body.len(), "ground truth: refreshed");
    Ok(())
  }

  async fn station_value(
    &self,
    station: &StationConfig,
    column: usize,
    observed_at: DateTime<Utc>,
  ) -> Result<f64, StationError> {
    let path = self.cache_path(station);
    let written = match tokio::fs::metadata(&path).await {
      Ok(meta) => Some(DateTime::<Utc>::from(meta.modified()?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
      Err(e) => return Err(e.into()),
    };
    if written.is_none_or(|w| refresh_due(w, observed_at)) {
      self.download(station, &path).await?;
    }
    let text = decode_latin1(&tokio::fs::read(&path).await?);
    parse_reading(&text, column).ok_or(StationError::Parse(column))
  }

  async fn reading(
    &self,
    station: Option<&StationConfig>,
    column: usize,
    observed_at: DateTime<Utc>,
    at: &Coordinates,
  ) -> Option<StationReading> {
    let station = station?;
    match self.station_value(station, column, observed_at).await {
      Ok(value) => Some(StationReading::at(value, &station.coordinates(), at)),
      Err(e) => {
        warn!(station = %station.name, error = %e, "ground truth: station unavailable");
        None
      }
    }
  }
}

impl GroundTruth for ReferenceStations {
  async fn reference_value(
    &self,
    entity_type: &EntityType,
    observed_at: DateTime<Utc>,
    at: Coordinates,
  ) -> Option<f64> {
    let column = self.column_for(entity_type)?;
    let stations = &self.config.stations;
    let a = self.reading(stations.first(), column, observed_at, &at).await;
    let b = self.reading(stations.get(1), column, observed_at, &at).await;
    blend_reference(a, b)
  }
}

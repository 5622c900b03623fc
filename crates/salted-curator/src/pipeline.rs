//! The [`Curator`]: one observation in, curated entities out.
//!
//! Stream mode canonicalises, validates, links the quality record and hands
//! clean observations to [`Curator::curate`]; flagged ones are stored as they
//! are. Batch mode only validates.

use std::{collections::BTreeMap, sync::Arc};

use chrono::TimeDelta;
use salted_core::{
  alias::{AliasTable, CANONICAL_ATTRIBUTES},
  entity::{Entity, EntityType},
  geo::BoundingBox,
  quality::Provenance,
  store::EntityStore,
};
use salted_quality::{
  registry::DetectorRegistry,
  validate::{Validation, validate},
};
use serde::Serialize;
use tracing::info;

use crate::{Error, Result, config::CuratorConfig, ground_truth::GroundTruth};

// ─── Settings ────────────────────────────────────────────────────────────────

/// The parts of [`CuratorConfig`] the pipeline reads on every observation.
#[derive(Debug, Clone)]
pub struct Settings {
  pub reference_area: BoundingBox,
  /// Lookback of temporal queries.
  pub window:         TimeDelta,
  pub provenance:     Provenance,
  pub aliases:        AliasTable,
}

impl Default for Settings {
  fn default() -> Self { Self::from_config(&CuratorConfig::default()) }
}

impl Settings {
  pub fn from_config(config: &CuratorConfig) -> Self {
    Self {
      reference_area: config.reference_area,
      window:         config.assessment.window(),
      provenance:     config.assessment.provenance(),
      aliases:        alias_table(&config.aliases),
    }
  }

  pub fn window_minutes(&self) -> f64 { self.window.num_seconds() as f64 / 60.0 }
}

/// Configuration keys may arrive lower-cased; map them back onto the
/// canonical attribute names.
fn alias_table(extra: &BTreeMap<String, Vec<String>>) -> AliasTable {
  let normalised: BTreeMap<String, Vec<String>> = extra
    .iter()
    .map(|(key, variants)| {
      let canonical = CANONICAL_ATTRIBUTES
        .iter()
        .find(|name| name.eq_ignore_ascii_case(key))
        .map_or_else(|| key.clone(), |name| (*name).to_string());
      (canonical, variants.clone())
    })
    .collect();
  AliasTable::with_extra(&normalised)
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamOutcome {
  pub id:        String,
  pub flagged:   bool,
  /// Synthetic observations written ahead of this one.
  pub synthetic: usize,
  pub persisted: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchOutcome {
  pub count:   usize,
  pub flagged: usize,
}

// ─── Curator ─────────────────────────────────────────────────────────────────

/// Owns the detector registry and processes one observation at a time.
pub struct Curator<S, G> {
  pub(crate) store:        Arc<S>,
  pub(crate) ground_truth: G,
  pub(crate) detectors:    DetectorRegistry,
  pub(crate) settings:     Settings,
}

impl<S, G> Curator<S, G>
where
  S: EntityStore,
  G: GroundTruth,
{
  pub fn new(store: Arc<S>, ground_truth: G, detectors: DetectorRegistry, settings: Settings) -> Self {
    Self { store, ground_truth, detectors, settings }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn detectors(&self) -> &DetectorRegistry { &self.detectors }

  pub fn settings(&self) -> &Settings { &self.settings }

  /// Curate one streamed observation of `topic_type`.
  pub async fn handle_stream(&mut self, mut entity: Entity, topic_type: &EntityType) -> Result<StreamOutcome> {
    entity.canonicalize(&self.settings.aliases);
    let Validation { mut entity, has_error } = validate(entity, topic_type);
    let id = entity.id.clone();

    if has_error {
      self
        .store
        .upsert(std::slice::from_ref(&entity))
        .await
        .map_err(Error::upstream)?;
      info!(%id, "persisted flagged observation");
      return Ok(StreamOutcome { persisted: vec![id.clone()], id, flagged: true, synthetic: 0 });
    }

    entity.link_quality();
    let curated = self.curate(entity).await?;
    info!(%id, quality = %curated.quality.id, synthetic = curated.synthetic, "curated observation");
    Ok(StreamOutcome {
      persisted: vec![id.clone(), curated.quality.id],
      id,
      flagged: false,
      synthetic: curated.synthetic,
    })
  }

  /// Validate every item and write the whole batch in one request.
  pub async fn handle_batch(&mut self, entities: Vec<Entity>, topic_type: &EntityType) -> Result<BatchOutcome> {
    let mut flagged = 0;
    let checked: Vec<Entity> = entities
      .into_iter()
      .map(|mut entity| {
        entity.canonicalize(&self.settings.aliases);
        let validation = validate(entity, topic_type);
        flagged += usize::from(validation.has_error);
        validation.entity
      })
      .collect();

    self.store.upsert(&checked).await.map_err(Error::upstream)?;
    info!(count = checked.len(), flagged, entity_type = %topic_type, "persisted batch");
    Ok(BatchOutcome { count: checked.len(), flagged })
  }
}

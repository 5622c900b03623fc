//! Gap backfill.
//!
//! When a series inside the reference area skips reports, one synthetic
//! observation is written per missing report before the real one, each
//! carrying the detector's estimate instead of a measurement. A gap of
//! [`UNRECOVERABLE_GAP`] or more is a break in the series: nothing is
//! synthesised and the real observation's completeness is forced to zero.

use chrono::TimeDelta;
use salted_core::{entity::Entity, quality::QualityRecord, store::EntityStore};
use salted_quality::dimensions::UNRECOVERABLE_GAP;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  dimensions::{self, Gap, Prior},
  ground_truth::GroundTruth,
  orchestrator::Plan,
  pipeline::Curator,
};

/// The real observation as written, with its quality record.
#[derive(Debug, Clone)]
pub struct Curated {
  pub observation: Entity,
  pub quality:     Entity,
  /// Synthetic pairs written before the real one.
  pub synthetic:   usize,
}

impl<S, G> Curator<S, G>
where
  S: EntityStore,
  G: GroundTruth,
{
  /// Assess and write `observation`, backfilling any gap before it.
  ///
  /// Every pair is its own upsert. On failure the call stops; synthetic pairs
  /// already written are left in place.
  pub async fn curate(&mut self, observation: Entity) -> Result<Curated> {
    let gap = if Plan::select(&observation, &self.settings.reference_area).backfills() {
      let prior = Prior::load(self.store.as_ref(), &observation, None).await?;
      dimensions::gap(&prior, &observation)?
    } else {
      Gap::default()
    };

    if gap.count >= UNRECOVERABLE_GAP {
      warn!(id = %observation.id, gap = gap.count, "series break, completeness penalised");
      let mut assessment = self.assess(&observation, false).await?;
      assessment.record.completeness = Some(0.0);
      let quality = self.write(&observation, &assessment.record).await?;
      return Ok(Curated { observation, quality, synthetic: 0 });
    }

    let at = observation.timestamp()?;
    for step in (1..=gap.count).rev() {
      let offset = f64::from(step) * gap.interval * 60_000.0;
      let mut synthetic = observation.with_timestamp(at - TimeDelta::milliseconds(offset.round() as i64));
      let assessment = self.assess(&synthetic, true).await?;
      if let Some(estimate) = assessment.substituted {
        synthetic.set_numeric_value(estimate);
      }
      self.write(&synthetic, &assessment.record).await?;
      debug!(id = %observation.id, step, estimate = ?assessment.substituted, "wrote synthetic observation");
    }

    let assessment = self.assess(&observation, false).await?;
    let quality = self.write(&observation, &assessment.record).await?;
    Ok(Curated { observation, quality, synthetic: gap.count as usize })
  }

  async fn write(&self, observation: &Entity, record: &QualityRecord) -> Result<Entity> {
    let quality = record.to_entity(&self.settings.provenance);
    self
      .store
      .upsert(&[observation.clone(), quality.clone()])
      .await
      .map_err(Error::upstream)?;
    Ok(quality)
  }
}

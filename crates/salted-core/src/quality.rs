//! The quality record attached to every curated observation.
//!
//! One record exists per series; its id is derived deterministically from the
//! observation id. The record is rewritten (upserted) every time an
//! observation of the series is curated, so its temporal history in the
//! broker is the series' quality history.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Value, json};

use crate::{
  Error, Result,
  entity::{Entity, EntityType},
  property::{as_flag, as_number, observed_property, property},
  time::{format_timestamp, parse_timestamp},
};

pub const QUALITY_ID_PREFIX: &str = "urn:ngsi-ld:DataQualityAssessment:";

const URN_PREFIX: &str = "urn:ngsi-ld:";

/// `urn:ngsi-ld:DataQualityAssessment:<suffix>` where `<suffix>` is the
/// observation id without its `urn:ngsi-ld:` prefix.
pub fn quality_id_for(entity_id: &str) -> String {
  let suffix = entity_id.strip_prefix(URN_PREFIX).unwrap_or(entity_id);
  format!("{QUALITY_ID_PREFIX}{suffix}")
}

// ─── Dimension values ────────────────────────────────────────────────────────

/// Absolute error against ground truth, or "not applicable" when no ground
/// truth could be obtained.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Accuracy {
  Measured(f64),
  NotApplicable,
}

impl Serialize for Accuracy {
  fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Measured(v) => s.serialize_f64(*v),
      Self::NotApplicable => s.serialize_str("N/A"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutlierTag {
  pub is_outlier:  bool,
  pub methodology: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticTag {
  pub is_synthetic:    bool,
  /// The model estimate that replaced the observed value, if any.
  pub estimated_value: Option<f64>,
  pub methodology:     String,
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Fixed metadata stamped on every quality record.
#[derive(Debug, Clone)]
pub struct Provenance {
  pub source:  String,
  pub context: String,
}

impl Default for Provenance {
  fn default() -> Self {
    Self {
      source:  "https://salted-project.eu".to_string(),
      context: "https://raw.githubusercontent.com/SALTED-Project/contexts/main/wrapped_contexts/dataqualityassessment-context.jsonld"
        .to_string(),
    }
  }
}

// ─── QualityRecord ───────────────────────────────────────────────────────────

/// The scores computed for one observation. Dimensions that were not
/// computed are `None` and are omitted from the encoded entity.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRecord {
  pub id:            String,
  pub calculated_at: DateTime<Utc>,
  pub accuracy:      Option<Accuracy>,
  pub precision:     Option<f64>,
  pub completeness:  Option<f64>,
  pub timeliness:    Option<f64>,
  pub outlier:       Option<OutlierTag>,
  pub synthetic:     Option<SyntheticTag>,
}

impl QualityRecord {
  pub fn new(id: impl Into<String>, calculated_at: DateTime<Utc>) -> Self {
    Self {
      id: id.into(),
      calculated_at,
      accuracy: None,
      precision: None,
      completeness: None,
      timeliness: None,
      outlier: None,
      synthetic: None,
    }
  }

  /// Encode as an NGSI-LD `DataQualityAssessment` entity.
  pub fn to_entity(&self, provenance: &Provenance) -> Entity {
    let at = self.calculated_at;
    let mut e = Entity::new(self.id.clone(), EntityType::DataQualityAssessment);

    e.set_attribute("dateCalculated", property(format_timestamp(at)));
    e.set_attribute("source", property(provenance.source.clone()));
    e.set_attribute("@context", json!([provenance.context]));

    if let Some(accuracy) = self.accuracy {
      e.set_attribute("accuracy", with_unit(observed_property(json!(accuracy), at), "CEL"));
    }
    if let Some(precision) = self.precision {
      e.set_attribute("precision", with_unit(observed_property(precision, at), "CEL"));
    }
    if let Some(timeliness) = self.timeliness {
      e.set_attribute("timeliness", with_unit(observed_property(timeliness, at), "minutes"));
    }
    if let Some(completeness) = self.completeness {
      e.set_attribute("completeness", with_unit(observed_property(completeness, at), "P1"));
    }
    if let Some(outlier) = &self.outlier {
      let value = json!({
        "isOutlier":   property(outlier.is_outlier),
        "methodology": property(outlier.methodology.clone()),
      });
      e.set_attribute("outlier", observed_property(value, at));
    }
    if let Some(synthetic) = &self.synthetic {
      let value = json!({
        "isSynthetic":    property(synthetic.is_synthetic),
        "estimatedValue": property(synthetic.estimated_value),
        "methodology":    property(synthetic.methodology.clone()),
      });
      e.set_attribute("synthetic", observed_property(value, at));
    }
    e
  }

  /// Decode a stored record. Attributes that are missing or unreadable decode
  /// as `None`.
  pub fn from_entity(entity: &Entity) -> Result<Self> {
    let calculated = match entity.property_value("dateCalculated") {
      Some(Value::String(s)) => parse_timestamp(s)?,
      _ => {
        return Err(Error::MissingAttribute {
          entity:    entity.id.clone(),
          attribute: "dateCalculated",
        });
      }
    };

    let number = |name: &str| entity.property_value(name).and_then(as_number);
    let accuracy = entity.property_value("accuracy").map(|v| {
      as_number(v).map_or(Accuracy::NotApplicable, Accuracy::Measured)
    });

    let outlier = entity.attribute("outlier").and_then(|attr| {
      Some(OutlierTag {
        is_outlier:  outlier_flag(attr)?,
        methodology: methodology(attr),
      })
    });
    let synthetic = entity.attribute("synthetic").and_then(|attr| {
      Some(SyntheticTag {
        is_synthetic:    synthetic_flag(attr)?,
        estimated_value: attr
          .pointer("/value/estimatedValue/value")
          .and_then(as_number),
        methodology:     methodology(attr),
      })
    });

    Ok(Self {
      id: entity.id.clone(),
      calculated_at: calculated,
      accuracy,
      precision: number("precision"),
      completeness: number("completeness"),
      timeliness: number("timeliness"),
      outlier,
      synthetic,
    })
  }
}

fn with_unit(mut prop: Value, unit: &str) -> Value {
  if let Some(obj) = prop.as_object_mut() {
    obj.insert("unitCode".into(), unit.into());
  }
  prop
}

fn methodology(attr: &Value) -> String {
  attr
    .pointer("/value/methodology/value")
    .and_then(Value::as_str)
    .unwrap_or_default()
    .to_string()
}

/// `isOutlier` of an `outlier` attribute instance.
pub fn outlier_flag(instance: &Value) -> Option<bool> {
  instance.pointer("/value/isOutlier/value").and_then(as_flag)
}

/// `isSynthetic` of a `synthetic` attribute instance.
pub fn synthetic_flag(instance: &Value) -> Option<bool> {
  instance.pointer("/value/isSynthetic/value").and_then(as_flag)
}

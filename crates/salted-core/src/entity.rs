//! NGSI-LD entities: the wire shape of every observation and quality record.
//!
//! An entity is an `id`, a `type`, and an open set of attributes. The curator
//! only interprets a handful of them (`value`, `location`, the observation
//! dates, `hasQuality`); everything else is carried through untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::EnumString;

use crate::{
  Error, Result,
  alias::AliasTable,
  geo::Coordinates,
  property::{as_number, relationship},
  quality::quality_id_for,
  time::{format_timestamp, parse_timestamp},
};

// ─── Entity type ─────────────────────────────────────────────────────────────

/// The NGSI-LD `type` of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString)]
#[derive(Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
  Temperature,
  AirQualityObserved,
  TrafficFlowObserved,
  DataQualityAssessment,
  #[strum(default)]
  Other(String),
}

impl EntityType {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Temperature => "Temperature",
      Self::AirQualityObserved => "AirQualityObserved",
      Self::TrafficFlowObserved => "TrafficFlowObserved",
      Self::DataQualityAssessment => "DataQualityAssessment",
      Self::Other(name) => name,
    }
  }
}

impl std::fmt::Display for EntityType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Known names map to their variant; anything else becomes `Other`.
/// String slices go through the strum-derived `FromStr` / `TryFrom<&str>`.
impl From<String> for EntityType {
  fn from(s: String) -> Self { s.parse().unwrap_or(Self::Other(s)) }
}

impl From<EntityType> for String {
  fn from(t: EntityType) -> Self { t.as_str().to_string() }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// Attributes holding the observation time, in order of preference.
const TIMESTAMP_ATTRIBUTES: [&str; 2] = ["dateObserved", "dateModified"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  pub id:          String,
  #[serde(rename = "type")]
  pub entity_type: EntityType,
  /// Every other top-level member, including `@context`.
  #[serde(flatten)]
  pub attributes:  Map<String, Value>,
}

impl Entity {
  pub fn new(id: impl Into<String>, entity_type: EntityType) -> Self {
    Self {
      id: id.into(),
      entity_type,
      attributes: Map::new(),
    }
  }

  pub fn attribute(&self, name: &str) -> Option<&Value> { self.attributes.get(name) }

  pub fn has_attribute(&self, name: &str) -> bool { self.attributes.contains_key(name) }

  pub fn set_attribute(&mut self, name: &str, value: Value) {
    self.attributes.insert(name.to_string(), value);
  }

  pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
    self.attributes.remove(name)
  }

  /// The `value` member of a Property attribute.
  pub fn property_value(&self, name: &str) -> Option<&Value> {
    self.attribute(name).and_then(|a| a.get("value"))
  }

  /// A Property's value read as a number (numeric strings accepted).
  pub fn number(&self, name: &str) -> Result<Option<f64>> {
    let Some(raw) = self.property_value(name) else {
      return Ok(None);
    };
    as_number(raw).map(Some).ok_or_else(|| Error::InvalidValue {
      entity:    self.id.clone(),
      attribute: name.to_string(),
      found:     raw.to_string(),
    })
  }

  /// The measured value of an observation.
  pub fn numeric_value(&self) -> Result<f64> {
    self.number("value")?.ok_or_else(|| Error::MissingAttribute {
      entity:    self.id.clone(),
      attribute: "value",
    })
  }

  /// Overwrite the measured value, keeping the rest of the Property intact.
  pub fn set_numeric_value(&mut self, value: f64) {
    match self.attributes.get_mut("value").and_then(Value::as_object_mut) {
      Some(prop) => {
        prop.insert("value".into(), value.into());
      }
      None => self.set_attribute("value", crate::property::property(value)),
    }
  }

  // ── Time ──────────────────────────────────────────────────────────────────

  /// Which of `dateObserved` / `dateModified` carries the observation time.
  pub fn timestamp_attribute(&self) -> Option<&'static str> {
    TIMESTAMP_ATTRIBUTES
      .into_iter()
      .find(|name| self.property_value(name).is_some())
  }

  /// When the observation was made: `dateObserved`, else `dateModified`.
  pub fn timestamp(&self) -> Result<DateTime<Utc>> {
    let attr = self.timestamp_attribute().ok_or_else(|| Error::MissingAttribute {
      entity:    self.id.clone(),
      attribute: "dateObserved",
    })?;
    match self.property_value(attr) {
      Some(Value::String(s)) => parse_timestamp(s),
      other => Err(Error::InvalidTimestamp(
        other.map(Value::to_string).unwrap_or_default(),
      )),
    }
  }

  /// A copy of this entity re-dated to `at`.
  ///
  /// Moves the observation date and every `observedAt` the curator relies on
  /// (`value` and, when present, `location`).
  pub fn with_timestamp(&self, at: DateTime<Utc>) -> Entity {
    let mut copy = self.clone();
    let stamp = Value::String(format_timestamp(at));
    let date_attr = self.timestamp_attribute().unwrap_or("dateObserved");

    match copy.attributes.get_mut(date_attr).and_then(Value::as_object_mut) {
      Some(prop) => {
        prop.insert("value".into(), stamp.clone());
      }
      None => copy.set_attribute(date_attr, crate::property::property(stamp.clone())),
    }
    for name in ["value", "location"] {
      if let Some(prop) = copy.attributes.get_mut(name).and_then(Value::as_object_mut)
        && (name == "value" || prop.contains_key("observedAt"))
      {
        prop.insert("observedAt".into(), stamp.clone());
      }
    }
    copy
  }

  // ── Location ──────────────────────────────────────────────────────────────

  /// `location.value.coordinates` as `[lon, lat]`, numbers or numeric strings.
  pub fn coordinates(&self) -> Option<Coordinates> {
    let coords = self
      .property_value("location")?
      .get("coordinates")?
      .as_array()?;
    match coords.as_slice() {
      [lon, lat, ..] => Some(Coordinates::new(as_number(lon)?, as_number(lat)?)),
      _ => None,
    }
  }

  // ── Quality link ──────────────────────────────────────────────────────────

  /// The id of the quality record this entity points at, if linked.
  pub fn quality_id(&self) -> Option<&str> {
    self.attribute("hasQuality")?.get("object")?.as_str()
  }

  /// Attach the `hasQuality` relationship and return the quality record id.
  pub fn link_quality(&mut self) -> String {
    let id = quality_id_for(&self.id);
    self.set_attribute("hasQuality", relationship(&id));
    id
  }

  // ── Vocabulary ────────────────────────────────────────────────────────────

  /// Rename vocabulary-prefixed attributes to their canonical names.
  ///
  /// If both a variant and the canonical name are present the canonical
  /// attribute wins and the variant is dropped.
  pub fn canonicalize(&mut self, aliases: &AliasTable) {
    let renames: Vec<(String, String)> = self
      .attributes
      .keys()
      .filter_map(|key| {
        aliases
          .resolve(key)
          .filter(|canonical| *canonical != key)
          .map(|canonical| (key.clone(), canonical.to_string()))
      })
      .collect();

    for (from, to) in renames {
      if let Some(value) = self.attributes.remove(&from)
        && !self.attributes.contains_key(&to)
      {
        self.attributes.insert(to, value);
      }
    }
  }
}

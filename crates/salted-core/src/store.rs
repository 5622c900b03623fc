//! The `EntityStore` trait and the temporal read model.
//!
//! The trait is implemented by broker backends (`salted-broker`). The curator
//! depends on this abstraction, never on a concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
  entity::{Entity, EntityType},
  geo::Coordinates,
  time::parse_timestamp,
};

// ─── Temporal entity ─────────────────────────────────────────────────────────

/// The temporal representation of an entity: each attribute is either a
/// single instance object or an array of instances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalEntity {
  #[serde(flatten)]
  pub attributes: Map<String, Value>,
}

impl TemporalEntity {
  pub fn has(&self, name: &str) -> bool { self.attributes.contains_key(name) }

  /// Instances of `name`, newest first by `observedAt`.
  ///
  /// Instances without a readable `observedAt` sort after all dated ones,
  /// keeping their original relative order.
  pub fn instances(&self, name: &str) -> Vec<&Value> {
    let mut out: Vec<&Value> = match self.attributes.get(name) {
      Some(Value::Array(items)) => items.iter().collect(),
      Some(single @ Value::Object(_)) => vec![single],
      _ => Vec::new(),
    };
    out.sort_by_key(|instance| std::cmp::Reverse(observed_at(instance)));
    out
  }

  pub fn count(&self, name: &str) -> usize { self.instances(name).len() }
}

/// The `observedAt` of one attribute instance.
pub fn observed_at(instance: &Value) -> Option<DateTime<Utc>> {
  instance
    .get("observedAt")
    .and_then(Value::as_str)
    .and_then(|s| parse_timestamp(s).ok())
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an NGSI-LD context broker.
///
/// Writes are upserts: attributes of an existing entity are replaced, and the
/// broker keeps the superseded instances in its temporal history. Nothing is
/// ever deleted.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait EntityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create or update `entities` in one request. Returns the broker's status
  /// code; an empty slice is a no-op.
  fn upsert<'a>(
    &'a self,
    entities: &'a [Entity],
  ) -> impl Future<Output = Result<u16, Self::Error>> + Send + 'a;

  /// Fetch the current state of one entity. `None` if it does not exist.
  fn get_by_id<'a>(
    &'a self,
    id: &'a str,
    entity_type: &'a EntityType,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + 'a;

  /// Fetch several entities of one type by id. Missing ids are skipped.
  fn get_many<'a>(
    &'a self,
    ids: &'a [String],
    entity_type: &'a EntityType,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Entities of `entity_type` within the backend's configured radius of
  /// `near`.
  fn get_by_type_near<'a>(
    &'a self,
    entity_type: &'a EntityType,
    near: Coordinates,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Attribute history of one entity since `since`, capped at the backend's
  /// configured `lastN` instances per attribute.
  fn get_temporal_by_id<'a>(
    &'a self,
    id: &'a str,
    entity_type: &'a EntityType,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<TemporalEntity, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn single_instance_is_normalised_to_a_list() {
    let t: TemporalEntity = serde_json::from_value(json!({
      "id": "q",
      "timeliness": { "type": "Property", "value": 5.0, "observedAt": "2023-01-01T00:00:00Z" }
    }))
    .unwrap();
    assert_eq!(t.count("timeliness"), 1);
    assert_eq!(t.count("completeness"), 0);
    assert!(!t.has("completeness"));
  }

  #[test]
  fn instances_are_newest_first() {
    let t: TemporalEntity = serde_json::from_value(json!({
      "timeliness": [
        { "value": 1.0, "observedAt": "2023-01-01T00:00:00Z" },
        { "value": 3.0, "observedAt": "2023-01-01T00:10:00Z" },
        { "value": 9.0 },
        { "value": 2.0, "observedAt": "2023-01-01T00:05:00Z" }
      ]
    }))
    .unwrap();
    let values: Vec<f64> = t
      .instances("timeliness")
      .iter()
      .map(|i| i["value"].as_f64().unwrap())
      .collect();
    assert_eq!(values, vec![3.0, 2.0, 1.0, 9.0]);
  }
}

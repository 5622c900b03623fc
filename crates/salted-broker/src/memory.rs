//! [`MemoryBroker`]: an in-process [`EntityStore`].
//!
//! Upserts merge attributes into the current entity and append the written
//! attributes to a history log, which backs temporal queries. Geo-queries use
//! the great-circle distance.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use salted_core::{
  entity::{Entity, EntityType},
  geo::Coordinates,
  store::{EntityStore, TemporalEntity, observed_at},
};

use crate::{Error, QueryLimits, Result};

#[derive(Debug, Default)]
struct State {
  entities:      BTreeMap<String, Entity>,
  history:       Vec<Entity>,
  upserts:       usize,
  /// Remaining upserts before writes start failing. `None` never fails.
  fail_after:    Option<usize>,
  fail_temporal: bool,
}

#[derive(Debug, Default)]
pub struct MemoryBroker {
  state:  Mutex<State>,
  limits: QueryLimits,
}

impl MemoryBroker {
  pub fn new(limits: QueryLimits) -> Self { Self { state: Mutex::default(), limits } }

  /// Make every upsert after the next `n` fail with a 503.
  pub async fn fail_writes_after(&self, n: usize) {
    self.state.lock().await.fail_after = Some(n);
  }

  /// Make every temporal query fail with a 503.
  pub async fn fail_temporal_reads(&self) {
    self.state.lock().await.fail_temporal = true;
  }

  /// Number of successful upsert calls.
  pub async fn upsert_count(&self) -> usize { self.state.lock().await.upserts }

  /// Every stored entity, ordered by id.
  pub async fn entities(&self) -> Vec<Entity> {
    self.state.lock().await.entities.values().cloned().collect()
  }

  /// Every write of `id`, oldest first.
  pub async fn history(&self, id: &str) -> Vec<Entity> {
    let state = self.state.lock().await;
    state.history.iter().filter(|e| e.id == id).cloned().collect()
  }
}

impl EntityStore for MemoryBroker {
  type Error = Error;

  async fn upsert(&self, entities: &[Entity]) -> Result<u16> {
    if entities.is_empty() {
      return Ok(200);
    }
    let mut guard = self.state.lock().await;
    let state = &mut *guard;
    if let Some(remaining) = state.fail_after.as_mut() {
      if *remaining == 0 {
        return Err(Error::Status { status: 503, url: "memory://upsert".to_string() });
      }
      *remaining -= 1;
    }

    let mut created = false;
    for entity in entities {
      match state.entities.get_mut(&entity.id) {
        Some(current) => {
          for (name, value) in &entity.attributes {
            current.attributes.insert(name.clone(), value.clone());
          }
        }
        None => {
          created = true;
          state.entities.insert(entity.id.clone(), entity.clone());
        }
      }
      state.history.push(entity.clone());
    }
    state.upserts += 1;
    Ok(if created { 201 } else { 204 })
  }

  async fn get_by_id(&self, id: &str, _entity_type: &EntityType) -> Result<Option<Entity>> {
    Ok(self.state.lock().await.entities.get(id).cloned())
  }

  async fn get_many(&self, ids: &[String], _entity_type: &EntityType) -> Result<Vec<Entity>> {
    let state = self.state.lock().await;
    Ok(ids.iter().filter_map(|id| state.entities.get(id).cloned()).collect())
  }

  async fn get_by_type_near(
    &self,
    entity_type: &EntityType,
    near: Coordinates,
  ) -> Result<Vec<Entity>> {
    let radius_km = self.limits.max_distance_m / 1000.0;
    let state = self.state.lock().await;
    Ok(
      state
        .entities
        .values()
        .filter(|e| &e.entity_type == entity_type)
        .filter(|e| e.coordinates().is_some_and(|c| c.distance_km(&near) <= radius_km))
        .cloned()
        .collect(),
    )
  }

  async fn get_temporal_by_id(
    &self,
    id: &str,
    _entity_type: &EntityType,
    since: DateTime<Utc>,
  ) -> Result<TemporalEntity> {
    let state = self.state.lock().await;
    if state.fail_temporal {
      return Err(Error::Status { status: 503, url: "memory://temporal".to_string() });
    }
    let mut attributes: Map<String, Value> = Map::new();
    let mut instances: BTreeMap<&str, Vec<Value>> = BTreeMap::new();

    for write in state.history.iter().filter(|e| e.id == id) {
      for (name, value) in &write.attributes {
        if observed_at(value).is_some_and(|at| at > since) {
          instances.entry(name.as_str()).or_default().push(value.clone());
        }
      }
    }
    if instances.is_empty() && !state.entities.contains_key(id) {
      return Ok(TemporalEntity::default());
    }

    attributes.insert("id".into(), Value::String(id.to_string()));
    for (name, mut values) in instances {
      values.sort_by_key(|v| std::cmp::Reverse(observed_at(v)));
      values.truncate(self.limits.last_n);
      attributes.insert(name.to_string(), Value::Array(values));
    }
    Ok(TemporalEntity { attributes })
  }
}

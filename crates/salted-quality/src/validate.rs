//! Structural and range checks applied to every inbound observation.
//!
//! Validation never talks to the network and never fails: problems are
//! recorded on the entity as flags (`location_unavailable`, `faulty_data`)
//! and reported through [`Validation::has_error`]. Flags are sticky in the
//! broker, so a clean observation explicitly resets any flag it carries to
//! `false` rather than omitting it.

use chrono::{DateTime, Utc};
use salted_core::{
  entity::{Entity, EntityType},
  property::observed_property,
};

pub const LOCATION_UNAVAILABLE: &str = "location_unavailable";
pub const FAULTY_DATA: &str = "faulty_data";

/// An inclusive bound on one attribute of one entity type.
struct RangeRule {
  entity_type: EntityType,
  attribute:   &'static str,
  min:         Option<f64>,
  max:         Option<f64>,
}

fn range_rules() -> [RangeRule; 4] {
  [
    RangeRule {
      entity_type: EntityType::AirQualityObserved,
      attribute:   "relativeHumidity",
      min:         None,
      max:         Some(100.0),
    },
    RangeRule {
      entity_type: EntityType::TrafficFlowObserved,
      attribute:   "occupancy",
      min:         None,
      max:         Some(100.0),
    },
    RangeRule {
      entity_type: EntityType::TrafficFlowObserved,
      attribute:   "intensity",
      min:         Some(0.0),
      max:         None,
    },
    RangeRule {
      entity_type: EntityType::TrafficFlowObserved,
      attribute:   "averageVehicleSpeed",
      min:         Some(0.0),
      max:         None,
    },
  ]
}

/// The annotated entity and whether any check failed.
#[derive(Debug, Clone)]
pub struct Validation {
  pub entity:    Entity,
  pub has_error: bool,
}

/// Validate `entity` as an observation of `entity_type`, stamping flags with
/// the current time.
pub fn validate(entity: Entity, entity_type: &EntityType) -> Validation {
  validate_at(entity, entity_type, Utc::now())
}

/// [`validate`] with an explicit flag timestamp.
pub fn validate_at(mut entity: Entity, entity_type: &EntityType, now: DateTime<Utc>) -> Validation {
  let mut has_error = false;

  // Location: present, readable, and not the (0, 0) placeholder.
  match entity.coordinates() {
    Some(point) if !point.is_degenerate() => {}
    Some(_) => {
      entity.remove_attribute("location");
      entity.set_attribute(LOCATION_UNAVAILABLE, observed_property(true, now));
      has_error = true;
    }
    None => {
      entity.set_attribute(LOCATION_UNAVAILABLE, observed_property(true, now));
      has_error = true;
    }
  }

  // Type-specific ranges.
  let mut faults: Vec<String> = Vec::new();
  for rule in range_rules().iter().filter(|r| &r.entity_type == entity_type) {
    match entity.number(rule.attribute) {
      Ok(None) => {}
      Ok(Some(v)) => {
        let below = rule.min.is_some_and(|min| v < min);
        let above = rule.max.is_some_and(|max| v > max);
        if below || above {
          faults.push(format!("{} out of range", rule.attribute));
        }
      }
      Err(_) => faults.push(format!("{} is not numeric", rule.attribute)),
    }
  }
  if !faults.is_empty() {
    entity.set_attribute(FAULTY_DATA, observed_property(faults.join("; "), now));
    has_error = true;
  }

  if !has_error {
    for flag in [FAULTY_DATA, LOCATION_UNAVAILABLE] {
      if entity.has_attribute(flag) {
        entity.set_attribute(flag, observed_property(false, now));
      }
    }
  }

  Validation { entity, has_error }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::{Value, json};

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2022, 5, 20, 7, 45, 0).unwrap() }

  fn located(entity_type: &str, coordinates: Value) -> Entity {
    serde_json::from_value(json!({
      "id": format!("urn:ngsi-ld:{entity_type}:test"),
      "type": entity_type,
      "location": {
        "type": "GeoProperty",
        "value": { "type": "Point", "coordinates": coordinates }
      }
    }))
    .unwrap()
  }

  fn traffic(occupancy: Value) -> Entity {
    let mut e = located("TrafficFlowObserved", json!([-3.4391538, 43.263564]));
    e.set_attribute("occupancy", json!({ "type": "Property", "value": occupancy }));
    e
  }

  fn flag(e: &Entity, name: &str) -> Option<Value> { e.property_value(name).cloned() }

  #[test]
  fn zero_zero_location_is_removed_and_flagged() {
    for coords in [json!([0, 0]), json!(["0", "0"]), json!([0.0, 0.0])] {
      let v = validate_at(located("Temperature", coords), &EntityType::Temperature, now());
      assert!(v.has_error);
      assert!(!v.entity.has_attribute("location"));
      assert_eq!(flag(&v.entity, LOCATION_UNAVAILABLE), Some(json!(true)));
    }
  }

  #[test]
  fn missing_location_is_flagged() {
    let e = Entity::new("urn:ngsi-ld:Temperature:x", EntityType::Temperature);
    let v = validate_at(e, &EntityType::Temperature, now());
    assert!(v.has_error);
    assert_eq!(flag(&v.entity, LOCATION_UNAVAILABLE), Some(json!(true)));
    assert_eq!(
      v.entity.attributes[LOCATION_UNAVAILABLE]["observedAt"],
      json!("2022-05-20T07:45:00Z")
    );
  }

  #[test]
  fn location_flag_survives_range_checks() {
    let mut e = traffic(json!(20));
    e.remove_attribute("location");
    e.set_attribute("intensity", json!({ "type": "Property", "value": -3 }));
    let v = validate_at(e, &EntityType::TrafficFlowObserved, now());
    assert!(v.has_error);
    assert_eq!(flag(&v.entity, LOCATION_UNAVAILABLE), Some(json!(true)));
    assert_eq!(flag(&v.entity, FAULTY_DATA), Some(json!("intensity out of range")));
  }

  #[test]
  fn occupancy_above_100_is_faulty() {
    let v = validate_at(traffic(json!(226)), &EntityType::TrafficFlowObserved, now());
    assert!(v.has_error);
    assert_eq!(flag(&v.entity, FAULTY_DATA), Some(json!("occupancy out of range")));
  }

  #[test]
  fn nan_occupancy_is_not_numeric() {
    let v = validate_at(traffic(json!("NaN")), &EntityType::TrafficFlowObserved, now());
    assert!(v.has_error);
    assert_eq!(flag(&v.entity, FAULTY_DATA), Some(json!("occupancy is not numeric")));
  }

  #[test]
  fn negative_speed_and_intensity_are_both_reported() {
    let mut e = traffic(json!(10));
    e.set_attribute("intensity", json!({ "type": "Property", "value": -1 }));
    e.set_attribute("averageVehicleSpeed", json!({ "type": "Property", "value": "-20" }));
    let v = validate_at(e, &EntityType::TrafficFlowObserved, now());
    assert_eq!(
      flag(&v.entity, FAULTY_DATA),
      Some(json!("intensity out of range; averageVehicleSpeed out of range"))
    );
  }

  #[test]
  fn humidity_rule_applies_only_to_air_quality() {
    let mut aq = located("AirQualityObserved", json!([-3.8, 43.46]));
    aq.set_attribute("relativeHumidity", json!({ "type": "Property", "value": 101 }));
    let mut temp = aq.clone();
    temp.entity_type = EntityType::Temperature;

    assert!(validate_at(aq, &EntityType::AirQualityObserved, now()).has_error);
    assert!(!validate_at(temp, &EntityType::Temperature, now()).has_error);
  }

  #[test]
  fn boundary_values_are_accepted() {
    let mut e = traffic(json!(100));
    e.set_attribute("intensity", json!({ "type": "Property", "value": 0 }));
    assert!(!validate_at(e, &EntityType::TrafficFlowObserved, now()).has_error);
  }

  #[test]
  fn clean_observation_clears_sticky_flags() {
    let mut e = traffic(json!(50));
    e.set_attribute(FAULTY_DATA, json!({ "type": "Property", "value": "occupancy out of range" }));
    e.set_attribute(LOCATION_UNAVAILABLE, json!({ "type": "Property", "value": true }));
    let v = validate_at(e, &EntityType::TrafficFlowObserved, now());
    assert!(!v.has_error);
    assert_eq!(flag(&v.entity, FAULTY_DATA), Some(json!(false)));
    assert_eq!(flag(&v.entity, LOCATION_UNAVAILABLE), Some(json!(false)));
  }

  #[test]
  fn clean_observation_without_flags_gains_none() {
    let v = validate_at(traffic(json!(50)), &EntityType::TrafficFlowObserved, now());
    assert!(!v.entity.has_attribute(FAULTY_DATA));
    assert!(!v.entity.has_attribute(LOCATION_UNAVAILABLE));
  }

  #[test]
  fn revalidation_is_idempotent() {
    let mut e = traffic(json!(50));
    e.set_attribute(FAULTY_DATA, json!({ "type": "Property", "value": "old" }));
    let once = validate_at(e, &EntityType::TrafficFlowObserved, now());
    let twice = validate_at(once.entity.clone(), &EntityType::TrafficFlowObserved, now());
    assert_eq!(once.entity, twice.entity);
    assert_eq!(once.has_error, twice.has_error);
  }
}

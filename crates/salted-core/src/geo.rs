//! Coordinates, great-circle distance and the reference area.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A WGS-84 point. NGSI-LD orders coordinates longitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub longitude: f64,
  pub latitude:  f64,
}

impl Coordinates {
  pub fn new(longitude: f64, latitude: f64) -> Self { Self { longitude, latitude } }

  /// `(0, 0)` is what broken collectors emit when they have no fix.
  pub fn is_degenerate(&self) -> bool { self.longitude == 0.0 && self.latitude == 0.0 }

  /// Haversine distance to `other`, in kilometres.
  pub fn distance_km(&self, other: &Coordinates) -> f64 {
    let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (other.longitude - self.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
  }

  /// The `coordinates=` query parameter form: `[lon,lat]`.
  pub fn to_query(&self) -> String { format!("[{},{}]", self.longitude, self.latitude) }
}

/// Axis-aligned box within which the extra quality processes apply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub min_longitude: f64,
  pub max_longitude: f64,
  pub min_latitude:  f64,
  pub max_latitude:  f64,
}

impl Default for BoundingBox {
  /// Santander city centre.
  fn default() -> Self {
    Self {
      min_longitude: -3.883333,
      max_longitude: -3.7625,
      min_latitude:  43.425,
      max_latitude:  43.481944,
    }
  }
}

impl BoundingBox {
  /// Inclusive on every edge.
  pub fn contains(&self, point: &Coordinates) -> bool {
    (self.min_longitude..=self.max_longitude).contains(&point.longitude)
      && (self.min_latitude..=self.max_latitude).contains(&point.latitude)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn distance_between_santander_stations() {
    // Santander city (1111X) and Parayas airport (1109X) are roughly 7 km apart.
    let city = Coordinates::new(-3.800556, 43.491111);
    let airport = Coordinates::new(-3.831389, 43.429167);
    let d = city.distance_km(&airport);
    assert!((6.5..7.5).contains(&d), "unexpected distance {d}");
  }

  #[test]
  fn distance_to_self_is_zero() {
    let p = Coordinates::new(-3.8, 43.46);
    assert_eq!(p.distance_km(&p), 0.0);
  }

  #[test]
  fn default_box_contains_city_centre() {
    let area = BoundingBox::default();
    assert!(area.contains(&Coordinates::new(-3.81, 43.46)));
    assert!(!area.contains(&Coordinates::new(-3.70, 43.46)));
    assert!(!area.contains(&Coordinates::new(-3.81, 43.50)));
  }

  #[test]
  fn degenerate_point() {
    assert!(Coordinates::new(0.0, 0.0).is_degenerate());
    assert!(!Coordinates::new(0.0, 43.0).is_degenerate());
  }
}

//! Canonical attribute names and the external vocabulary variants that map
//! onto them.
//!
//! Collectors that expand JSON-LD terms send fully-qualified attribute names
//! such as `https://smartdatamodels.org/dataModel.Environment/relativeHumidity`.
//! The table is applied once per entity at ingestion so the rest of the
//! pipeline only ever looks up canonical names.

use std::collections::BTreeMap;

/// Attribute names the curator reads or writes.
pub const CANONICAL_ATTRIBUTES: &[&str] = &[
  "location",
  "value",
  "dateObserved",
  "dateModified",
  "relativeHumidity",
  "occupancy",
  "intensity",
  "averageVehicleSpeed",
  "faulty_data",
  "location_unavailable",
  "hasQuality",
];

/// Canonical name → accepted variants.
#[derive(Debug, Clone)]
pub struct AliasTable {
  variants: BTreeMap<String, Vec<String>>,
}

impl Default for AliasTable {
  fn default() -> Self {
    Self {
      variants: CANONICAL_ATTRIBUTES
        .iter()
        .map(|name| ((*name).to_string(), Vec::new()))
        .collect(),
    }
  }
}

impl AliasTable {
  /// The default table plus operator-supplied variants.
  pub fn with_extra(extra: &BTreeMap<String, Vec<String>>) -> Self {
    let mut table = Self::default();
    for (canonical, names) in extra {
      table
        .variants
        .entry(canonical.clone())
        .or_default()
        .extend(names.iter().cloned());
    }
    table
  }

  /// The canonical name for `key`, if `key` is one of its accepted variants.
  ///
  /// A key that already is canonical resolves to itself. Beyond the explicit
  /// variants, an IRI whose last path or fragment segment is a canonical name
  /// is accepted.
  pub fn resolve<'a>(&'a self, key: &str) -> Option<&'a str> {
    if let Some((canonical, _)) = self.variants.get_key_value(key) {
      return Some(canonical.as_str());
    }
    for (canonical, names) in &self.variants {
      if names.iter().any(|n| n == key) {
        return Some(canonical.as_str());
      }
    }
    let tail = key.rsplit(['/', '#']).next()?;
    if tail.len() == key.len() {
      return None;
    }
    self
      .variants
      .get_key_value(tail)
      .map(|(canonical, _)| canonical.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_resolves_to_itself() {
    let t = AliasTable::default();
    assert_eq!(t.resolve("occupancy"), Some("occupancy"));
  }

  #[test]
  fn iri_suffix_resolves() {
    let t = AliasTable::default();
    assert_eq!(
      t.resolve("https://smartdatamodels.org/dataModel.Environment/relativeHumidity"),
      Some("relativeHumidity")
    );
    assert_eq!(t.resolve("https://example.org/vocab#intensity"), Some("intensity"));
  }

  #[test]
  fn unknown_keys_are_left_alone() {
    let t = AliasTable::default();
    assert_eq!(t.resolve("https://example.org/vocab/pm10"), None);
    assert_eq!(t.resolve("pm10"), None);
    // A suffix match must be a whole segment.
    assert_eq!(t.resolve("https://example.org/xoccupancy"), None);
  }

  #[test]
  fn extra_variants() {
    let mut extra = BTreeMap::new();
    extra.insert("occupancy".to_string(), vec!["ocupacion".to_string()]);
    let t = AliasTable::with_extra(&extra);
    assert_eq!(t.resolve("ocupacion"), Some("occupancy"));
  }
}

//! Resolution of the JSON-LD `@context` sent with every read.

use salted_core::entity::EntityType;

pub const DEFAULT_CONTEXT_BASE: &str =
  "https://raw.githubusercontent.com/SALTED-Project/contexts/main/wrapped_contexts/";

const JSON_LD_CONTEXT_REL: &str = "http://www.w3.org/ns/json-ld#context";

/// Maps entity types to their context documents.
///
/// Known types resolve to `<base><type lowercased>-context.jsonld`; anything
/// else gets `<base>default-context.jsonld`.
#[derive(Debug, Clone)]
pub struct ContextTable {
  base:  String,
  types: Vec<String>,
}

impl ContextTable {
  pub fn new(base: impl Into<String>, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      base:  base.into(),
      types: types.into_iter().map(Into::into).collect(),
    }
  }

  pub fn url_for(&self, entity_type: &EntityType) -> String {
    let name = entity_type.as_str();
    if self.types.iter().any(|t| t == name) {
      format!("{}{}-context.jsonld", self.base, name.to_lowercase())
    } else {
      format!("{}default-context.jsonld", self.base)
    }
  }

  /// Value of the `Link` header for requests about `entity_type`.
  pub fn link_header(&self, entity_type: &EntityType) -> String {
    format!(
      "<{}>; rel=\"{JSON_LD_CONTEXT_REL}\"; type=\"application/ld+json\"",
      self.url_for(entity_type)
    )
  }
}

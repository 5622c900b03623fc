//! NGSI-LD context broker backends for the SALTED curator.
//!
//! [`HttpBroker`] talks to a Scorpio-compatible broker over HTTP.
//! [`MemoryBroker`] keeps everything in process, including the temporal
//! history, and is what the curator's tests run against.

mod context;
mod http;
mod memory;

pub mod error;

pub use context::{ContextTable, DEFAULT_CONTEXT_BASE};
pub use error::{Error, Result};
pub use http::{BrokerConfig, HttpBroker};
pub use memory::MemoryBroker;

/// Server-side query limits shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryLimits {
  /// Radius of `near` geo-queries, in metres.
  pub max_distance_m: f64,
  /// Temporal instances returned per attribute.
  pub last_n:         usize,
}

impl Default for QueryLimits {
  fn default() -> Self { Self { max_distance_m: 500.0, last_n: 100 } }
}

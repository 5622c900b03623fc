//! Quality algorithms for the SALTED curator.
//!
//! Everything in this crate is synchronous and free of network access: the
//! structural validator, the streaming anomaly detector and its on-disk
//! snapshot, and the arithmetic behind each quality dimension. The async
//! orchestration that feeds these from the broker lives in `salted-curator`.

pub mod detector;
pub mod dimensions;
pub mod error;
pub mod registry;
pub mod snapshot;
pub mod validate;

pub use error::{Error, Result};

//! Core types and trait definitions for the SALTED curator.
//!
//! This crate is deliberately free of HTTP and file-system dependencies.
//! Every other crate depends on it: the NGSI-LD entity model, the quality
//! record, geographic helpers and the [`store::EntityStore`] abstraction all
//! live here.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod alias;
pub mod entity;
pub mod error;
pub mod geo;
pub mod property;
pub mod quality;
pub mod store;
pub mod time;

pub use error::{Error, Result};

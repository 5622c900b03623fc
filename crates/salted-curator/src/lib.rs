//! The SALTED curator service.
//!
//! Exposes an axum [`Router`] that accepts observations on
//! `/ingest/{entity_type}/{mode}` (mirroring the upstream `<type>/<mode>`
//! topics) and runs them through validation, anomaly detection, quality
//! assessment and gap backfill before writing them to the broker.
//!
//! Observations are processed strictly one at a time: the [`Curator`] sits
//! behind a [`tokio::sync::Mutex`].

pub mod backfill;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod ground_truth;
pub mod orchestrator;
pub mod pipeline;

pub use error::{ApiError, Error, Result};
pub use pipeline::{Curator, Settings};

use std::sync::Arc;

use axum::{
  Json, Router,
  body::Bytes,
  extract::{Path, State},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use salted_core::{
  entity::{Entity, EntityType},
  store::EntityStore,
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::error;

use ground_truth::GroundTruth;

pub type SharedCurator<S, G> = Arc<Mutex<Curator<S, G>>>;

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the ingest router around `curator`.
pub fn router<S, G>(curator: SharedCurator<S, G>) -> Router
where
  S: EntityStore + 'static,
  G: GroundTruth + 'static,
{
  Router::new()
    .route("/health", get(health))
    .route("/ingest/{entity_type}/{mode}", post(ingest::<S, G>))
    .layer(TraceLayer::new_for_http())
    .with_state(curator)
}

async fn health() -> &'static str { "ok" }

/// `POST /ingest/{entity_type}/stream`: body is one entity.
/// `POST /ingest/{entity_type}/batch`: body is an array of entities.
async fn ingest<S, G>(
  State(curator): State<SharedCurator<S, G>>,
  Path((entity_type, mode)): Path<(String, String)>,
  body: Bytes,
) -> Result<Response, ApiError>
where
  S: EntityStore + 'static,
  G: GroundTruth + 'static,
{
  let topic_type = EntityType::from(entity_type);
  match mode.as_str() {
    "stream" => {
      let entity: Entity = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid entity: {e}")))?;
      let id = entity.id.clone();
      let outcome = curator
        .lock()
        .await
        .handle_stream(entity, &topic_type)
        .await
        .inspect_err(|e| error!(%id, error = %e, "observation dropped"))?;
      Ok(Json(outcome).into_response())
    }
    "batch" => {
      let entities: Vec<Entity> = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid batch: {e}")))?;
      let outcome = curator
        .lock()
        .await
        .handle_batch(entities, &topic_type)
        .await
        .inspect_err(|e| error!(entity_type = %topic_type, error = %e, "batch dropped"))?;
      Ok(Json(outcome).into_response())
    }
    other => Err(ApiError::NotFound(format!("unknown mode {other:?}"))),
  }
}

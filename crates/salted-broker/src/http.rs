//! [`HttpBroker`]: the NGSI-LD REST implementation of [`EntityStore`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use salted_core::{
  entity::{Entity, EntityType},
  geo::Coordinates,
  store::{EntityStore, TemporalEntity},
  time::format_timestamp,
};

use crate::{ContextTable, DEFAULT_CONTEXT_BASE, Error, QueryLimits, Result};

const LD_JSON: &str = "application/ld+json";

// ─── Config ──────────────────────────────────────────────────────────────────

/// Connection settings for the broker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
  pub url:          String,
  pub context_base: String,
  /// Types with a dedicated context document.
  pub types:        Vec<String>,
  pub timeout_secs: u64,
}

impl Default for BrokerConfig {
  fn default() -> Self {
    Self {
      url:          "http://localhost:9090".to_string(),
      context_base: DEFAULT_CONTEXT_BASE.to_string(),
      types:        [
        EntityType::Temperature,
        EntityType::AirQualityObserved,
        EntityType::TrafficFlowObserved,
        EntityType::DataQualityAssessment,
      ]
      .iter()
      .map(|t| t.as_str().to_string())
      .collect(),
      timeout_secs: 30,
    }
  }
}

// ─── Broker ──────────────────────────────────────────────────────────────────

/// An NGSI-LD broker reached over HTTP.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based. No request is
/// ever retried.
#[derive(Debug, Clone)]
pub struct HttpBroker {
  client:   Client,
  base:     String,
  contexts: ContextTable,
  limits:   QueryLimits,
}

impl HttpBroker {
  pub fn new(config: &BrokerConfig, limits: QueryLimits) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      client,
      base: config.url.trim_end_matches('/').to_string(),
      contexts: ContextTable::new(config.context_base.clone(), config.types.iter().cloned()),
      limits,
    })
  }

  fn url(&self, path: &str) -> String { format!("{}/ngsi-ld/v1/{}", self.base, path) }

  /// A GET carrying the JSON-LD accept and context headers for `entity_type`.
  fn get(&self, url: &str, entity_type: &EntityType) -> RequestBuilder {
    self
      .client
      .get(url)
      .header(header::ACCEPT, LD_JSON)
      .header(header::LINK, self.contexts.link_header(entity_type))
  }

  async fn read<T: DeserializeOwned>(request: RequestBuilder, url: &str) -> Result<Option<T>> {
    let response = request.send().await?;
    if response.status() == StatusCode::NOT_FOUND {
      debug!(url, "broker: not found");
      return Ok(None);
    }
    let body = check(response, url).await?.text().await?;
    Ok(Some(serde_json::from_str(&body)?))
  }
}

async fn check(response: Response, url: &str) -> Result<Response> {
  let status = response.status();
  if status.is_client_error() || status.is_server_error() {
    return Err(Error::Status { status: status.as_u16(), url: url.to_string() });
  }
  Ok(response)
}

impl EntityStore for HttpBroker {
  type Error = Error;

  async fn upsert(&self, entities: &[Entity]) -> Result<u16> {
    if entities.is_empty() {
      return Ok(StatusCode::OK.as_u16());
    }
    let url = self.url("entityOperations/upsert");
    let body = serde_json::to_vec(entities)?;
    let response = self
      .client
      .post(&url)
      .query(&[("options", "update")])
      .header(header::CONTENT_TYPE, LD_JSON)
      .body(body)
      .send()
      .await?;
    let status = check(response, &url).await?.status().as_u16();
    debug!(count = entities.len(), status, "broker: upsert");
    Ok(status)
  }

  async fn get_by_id(&self, id: &str, entity_type: &EntityType) -> Result<Option<Entity>> {
    let url = self.url(&format!("entities/{id}"));
    Self::read(self.get(&url, entity_type), &url).await
  }

  async fn get_many(&self, ids: &[String], entity_type: &EntityType) -> Result<Vec<Entity>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let url = self.url("entities/");
    let request = self.get(&url, entity_type).query(&[("id", ids.join(","))]);
    Ok(Self::read(request, &url).await?.unwrap_or_default())
  }

  async fn get_by_type_near(
    &self,
    entity_type: &EntityType,
    near: Coordinates,
  ) -> Result<Vec<Entity>> {
    let url = self.url("entities/");
    let request = self.get(&url, entity_type).query(&[
      ("type", entity_type.as_str().to_string()),
      ("georel", format!("near;maxDistance=={}", self.limits.max_distance_m)),
      ("coordinates", near.to_query()),
      ("geometry", "Point".to_string()),
    ]);
    Ok(Self::read(request, &url).await?.unwrap_or_default())
  }

  async fn get_temporal_by_id(
    &self,
    id: &str,
    entity_type: &EntityType,
    since: DateTime<Utc>,
  ) -> Result<TemporalEntity> {
    let url = self.url(&format!("temporal/entities/{id}"));
    let request = self.get(&url, entity_type).query(&[
      ("timerel", "after".to_string()),
      ("timeAt", format_timestamp(since)),
      ("lastN", self.limits.last_n.to_string()),
    ]);
    Ok(Self::read(request, &url).await?.unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn urls_are_rooted_at_the_ngsi_ld_api() {
    let config = BrokerConfig { url: "http://scorpio:9090/".into(), ..BrokerConfig::default() };
    let broker = HttpBroker::new(&config, QueryLimits::default()).unwrap();
    assert_eq!(
      broker.url("entities/urn:ngsi-ld:Temperature:1"),
      "http://scorpio:9090/ngsi-ld/v1/entities/urn:ngsi-ld:Temperature:1"
    );
  }

  #[test]
  fn default_types_cover_the_curated_models() {
    let config = BrokerConfig::default();
    assert_eq!(config.types.len(), 4);
    assert!(config.types.contains(&"DataQualityAssessment".to_string()));
    assert_eq!(config.timeout_secs, 30);
  }

  #[tokio::test]
  async fn empty_upsert_skips_the_network() {
    let config = BrokerConfig { url: "http://127.0.0.1:9".into(), ..BrokerConfig::default() };
    let broker = HttpBroker::new(&config, QueryLimits::default()).unwrap();
    assert_eq!(broker.upsert(&[]).await.unwrap(), 200);
    assert!(broker.get_many(&[], &EntityType::Temperature).await.unwrap().is_empty());
  }
}

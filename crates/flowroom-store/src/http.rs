use std::time::Duration;

use async_trait::async_trait;
use flowroom_config::RoomDocument;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{DocumentUpdate, SharedState, StoreError};

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
  /// Base URL of the collaboration backend.
  pub base_url: Url,
  /// Backend secret sent as a bearer token.
  pub secret: String,
  pub timeout: Duration,
  /// Attempts made when a write loses a version race.
  pub max_attempts: u32,
}

impl HttpStoreConfig {
  pub fn new(base_url: Url, secret: impl Into<String>) -> Self {
    Self {
      base_url,
      secret: secret.into(),
      timeout: Duration::from_secs(10),
      max_attempts: 3,
    }
  }
}

/// Versioned document as exchanged with the backend.
#[derive(Debug, Serialize, Deserialize)]
struct VersionedDocument {
  version: u64,
  document: RoomDocument,
}

/// Store backed by the collaboration backend's document API.
///
/// Reads are `GET {base}/rooms/{room}/document`; writes `PUT` the same path
/// with the version that was read. A 409 means someone else wrote first, so
/// the document is read again and the update re-applied.
#[derive(Debug, Clone)]
pub struct HttpStore {
  client: reqwest::Client,
  config: HttpStoreConfig,
}

impl HttpStore {
  pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
    let client = reqwest::Client::builder().timeout(config.timeout).build()?;
    Ok(Self { client, config })
  }

  fn document_url(&self, room_id: &str) -> Result<Url, StoreError> {
    let mut url = self.config.base_url.clone();
    url
      .path_segments_mut()
      .map_err(|_| StoreError::Unavailable(format!("invalid store url: {}", self.config.base_url)))?
      .pop_if_empty()
      .extend(["rooms", room_id, "document"]);
    Ok(url)
  }

  async fn fetch(&self, room_id: &str) -> Result<VersionedDocument, StoreError> {
    let response = self
      .client
      .get(self.document_url(room_id)?)
      .bearer_auth(&self.config.secret)
      .send()
      .await
      .map_err(unavailable)?;

    match response.status() {
      StatusCode::NOT_FOUND => Err(StoreError::RoomNotFound(room_id.to_string())),
      status if status.is_success() => Ok(response.json().await?),
      status => Err(StoreError::Unavailable(format!(
        "store returned {} for room {}",
        status, room_id
      ))),
    }
  }
}

fn unavailable(e: reqwest::Error) -> StoreError {
  StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl SharedState for HttpStore {
  async fn snapshot(&self, room_id: &str) -> Result<RoomDocument, StoreError> {
    Ok(self.fetch(room_id).await?.document)
  }

  async fn mutate(&self, room_id: &str, update: &DocumentUpdate<'_>) -> Result<(), StoreError> {
    for attempt in 1..=self.config.max_attempts {
      let mut current = self.fetch(room_id).await?;
      update(&mut current.document);

      let response = self
        .client
        .put(self.document_url(room_id)?)
        .bearer_auth(&self.config.secret)
        .json(&current)
        .send()
        .await
        .map_err(unavailable)?;

      match response.status() {
        StatusCode::CONFLICT => {
          debug!(room_id = %room_id, attempt, "document version conflict, retrying");
        }
        StatusCode::NOT_FOUND => return Err(StoreError::RoomNotFound(room_id.to_string())),
        status if status.is_success() => return Ok(()),
        status => {
          return Err(StoreError::Unavailable(format!(
            "store returned {} for room {}",
            status, room_id
          )));
        }
      }
    }

    Err(StoreError::Conflict(room_id.to_string()))
  }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use flowroom_config::RoomDocument;
use tokio::sync::RwLock;

use crate::{DocumentUpdate, SharedState, StoreError};

/// Process-local store. Each mutation runs under the write lock.
#[derive(Debug)]
pub struct InMemoryStore {
  rooms: RwLock<HashMap<String, RoomDocument>>,
  available: AtomicBool,
}

impl InMemoryStore {
  pub fn new() -> Self {
    Self {
      rooms: RwLock::new(HashMap::new()),
      available: AtomicBool::new(true),
    }
  }

  /// Create or replace a room.
  pub async fn insert_room(&self, room_id: impl Into<String>, document: RoomDocument) {
    self.rooms.write().await.insert(room_id.into(), document);
  }

  /// When false, every call fails with [`StoreError::Unavailable`].
  pub fn set_available(&self, available: bool) {
    self.available.store(available, Ordering::SeqCst);
  }

  fn check_available(&self) -> Result<(), StoreError> {
    if self.available.load(Ordering::SeqCst) {
      Ok(())
    } else {
      Err(StoreError::Unavailable("in-memory store switched off".to_string()))
    }
  }
}

impl Default for InMemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl SharedState for InMemoryStore {
  async fn snapshot(&self, room_id: &str) -> Result<RoomDocument, StoreError> {
    self.check_available()?;
    self
      .rooms
      .read()
      .await
      .get(room_id)
      .cloned()
      .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))
  }

  async fn mutate(&self, room_id: &str, update: &DocumentUpdate<'_>) -> Result<(), StoreError> {
    self.check_available()?;
    let mut rooms = self.rooms.write().await;
    let document = rooms
      .get_mut(room_id)
      .ok_or_else(|| StoreError::RoomNotFound(room_id.to_string()))?;
    update(document);
    Ok(())
  }
}

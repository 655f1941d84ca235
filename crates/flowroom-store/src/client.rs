use std::sync::Arc;

use flowroom_config::RoomDocument;
use tracing::warn;

use crate::{SharedState, StoreError};

/// What happened to a best-effort write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  Applied,
  /// The write failed and was discarded.
  Dropped { reason: String },
}

impl SyncOutcome {
  pub fn is_applied(&self) -> bool {
    matches!(self, SyncOutcome::Applied)
  }
}

/// Best-effort view over a [`SharedState`] backend.
///
/// Reads surface their errors. Writes never do: a failed mutation is logged
/// and reported as [`SyncOutcome::Dropped`], and the caller carries on as if
/// it had been applied.
#[derive(Clone)]
pub struct SharedStateClient {
  store: Arc<dyn SharedState>,
}

impl SharedStateClient {
  pub fn new(store: Arc<dyn SharedState>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<dyn SharedState> {
    &self.store
  }

  pub async fn snapshot(&self, room_id: &str) -> Result<RoomDocument, StoreError> {
    self.store.snapshot(room_id).await
  }

  pub async fn mutate<F>(&self, room_id: &str, update: F) -> SyncOutcome
  where
    F: Fn(&mut RoomDocument) + Send + Sync,
  {
    match self.store.mutate(room_id, &update).await {
      Ok(()) => SyncOutcome::Applied,
      Err(e) => {
        warn!(room_id = %room_id, error = %e, "shared state write dropped");
        SyncOutcome::Dropped {
          reason: e.to_string(),
        }
      }
    }
  }
}

impl std::fmt::Debug for SharedStateClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SharedStateClient").finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::InMemoryStore;
  use flowroom_config::Node;

  #[tokio::test]
  async fn test_mutate_applied() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_room("room", RoomDocument::default()).await;
    let client = SharedStateClient::new(store.clone());

    let outcome = client
      .mutate("room", |doc| doc.insert_node(Node::new("a", "A", "return 1")))
      .await;

    assert!(outcome.is_applied());
    let doc = client.snapshot("room").await.unwrap();
    assert!(doc.node("a").is_some());
  }

  #[tokio::test]
  async fn test_mutate_with_borrowing_closure() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_room("room", RoomDocument::default()).await;
    let client = SharedStateClient::new(store.clone());

    let node_id = String::from("borrowed");
    let code = String::from("return input");
    let outcome = client
      .mutate("room", |doc| {
        doc.insert_node(Node::new(node_id.as_str(), "Borrowed", code.as_str()))
      })
      .await;

    assert!(outcome.is_applied());
    let doc = client.snapshot("room").await.unwrap();
    assert_eq!(doc.node(&node_id).map(|n| n.code.as_str()), Some("return input"));
  }

  #[tokio::test]
  async fn test_mutate_dropped_when_unavailable() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_room("room", RoomDocument::default()).await;
    store.set_available(false);
    let client = SharedStateClient::new(store.clone());

    let outcome = client.mutate("room", |_| {}).await;

    match outcome {
      SyncOutcome::Dropped { reason } => assert!(reason.contains("unavailable")),
      SyncOutcome::Applied => panic!("expected the write to be dropped"),
    }
    assert!(client.snapshot("room").await.is_err());
  }

  #[tokio::test]
  async fn test_mutate_unknown_room_is_dropped() {
    let client = SharedStateClient::new(Arc::new(InMemoryStore::new()));
    let outcome = client.mutate("missing", |_| {}).await;
    assert!(!outcome.is_applied());
  }
}

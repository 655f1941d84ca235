//! Flowroom Store
//!
//! Access to the shared document of a room: its nodes, edges and execution
//! history. The engine reads a fresh [`RoomDocument`] snapshot before acting
//! on a node and applies every change through [`SharedState::mutate`], which
//! backends run as a single transaction.
//!
//! Backends:
//! - [`InMemoryStore`] for tests and single-process runs
//! - [`SqliteStore`] for local persistence
//! - [`HttpStore`] for the collaboration backend
//!
//! Writes made on behalf of a running flow are best-effort. Wrap a backend in
//! a [`SharedStateClient`] to get that policy.

mod client;
mod error;
mod http;
mod memory;
mod sqlite;

pub use client::{SharedStateClient, SyncOutcome};
pub use error::StoreError;
pub use http::{HttpStore, HttpStoreConfig};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use flowroom_config::RoomDocument;

/// A change applied to a room document inside a store transaction.
///
/// Optimistic backends may apply the same update more than once when they
/// lose a race, so it must be an `Fn`.
pub type DocumentUpdate<'a> = dyn Fn(&mut RoomDocument) + Send + Sync + 'a;

/// Transactional access to room documents.
#[async_trait]
pub trait SharedState: Send + Sync {
  /// Read the current document of a room.
  async fn snapshot(&self, room_id: &str) -> Result<RoomDocument, StoreError>;

  /// Apply `update` to the room document atomically.
  async fn mutate(&self, room_id: &str, update: &DocumentUpdate<'_>) -> Result<(), StoreError>;
}

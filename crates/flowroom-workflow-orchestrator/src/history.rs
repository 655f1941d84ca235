use std::sync::atomic::{AtomicBool, Ordering};

use flowroom_config::{ExecutionRecord, ExecutionStatus, ExecutionUpdate, NodeExecutionResult};
use flowroom_store::{SharedStateClient, SyncOutcome};
use tracing::debug;

/// Keeps a room's execution history up to date.
///
/// All writes go through the best-effort client; a failed write is logged
/// there and the run proceeds.
#[derive(Debug, Clone)]
pub struct HistoryRecorder {
  client: SharedStateClient,
  limit: usize,
}

impl HistoryRecorder {
  pub fn new(client: SharedStateClient, limit: usize) -> Self {
    Self { client, limit }
  }

  /// Insert `record` at the head of the history, dropping the oldest
  /// entries beyond the limit.
  pub async fn begin(&self, room_id: &str, record: ExecutionRecord) -> SyncOutcome {
    let limit = self.limit;
    self
      .client
      .mutate(room_id, move |doc| doc.push_execution(record.clone(), limit))
      .await
  }

  /// Merge `update` into the record with id `execution_id`.
  pub async fn advance(
    &self,
    room_id: &str,
    execution_id: &str,
    update: ExecutionUpdate,
  ) -> SyncOutcome {
    let found = AtomicBool::new(false);
    let outcome = self
      .client
      .mutate(room_id, |doc| {
        found.store(doc.update_execution(execution_id, &update), Ordering::Relaxed);
      })
      .await;

    if outcome.is_applied() && !found.load(Ordering::Relaxed) {
      debug!(room_id = %room_id, execution_id = %execution_id, "execution record not found, update skipped");
    }
    outcome
  }

  /// Advance with a terminal status and the completion time.
  pub async fn finish(
    &self,
    room_id: &str,
    execution_id: &str,
    status: ExecutionStatus,
    results: &[NodeExecutionResult],
  ) -> SyncOutcome {
    self
      .advance(room_id, execution_id, ExecutionUpdate::finished(status, results))
      .await
  }
}

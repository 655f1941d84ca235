//! Caller-side execution of handed-off nodes.

use std::sync::Arc;
use std::time::Duration;

use flowroom_store::{SharedStateClient, StoreError};
use flowroom_task_runtime::ScriptExecutor;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Picks up caller-mode nodes that the engine marked as pending, runs them
/// with a local executor, and writes the outcome back.
///
/// This is the counterpart of the dispatcher's caller mode, standing in for
/// the canvas client.
pub struct CallerWorker {
  client: SharedStateClient,
  executor: Arc<dyn ScriptExecutor>,
  poll_interval: Duration,
}

impl CallerWorker {
  pub fn new(
    client: SharedStateClient,
    executor: Arc<dyn ScriptExecutor>,
    poll_interval: Duration,
  ) -> Self {
    Self {
      client,
      executor,
      poll_interval,
    }
  }

  /// Run every node of the room that is currently pending. Returns how many
  /// were executed.
  #[instrument(name = "caller_process_pending", skip(self), fields(room_id = %room_id))]
  pub async fn process_pending(&self, room_id: &str) -> Result<usize, StoreError> {
    let doc = self.client.snapshot(room_id).await?;
    let mut pending: Vec<_> = doc
      .nodes
      .values()
      .filter(|node| node.pending_caller_execution)
      .collect();
    pending.sort_by(|a, b| a.id.cmp(&b.id));

    for node in &pending {
      let input = node.caller_input.clone().unwrap_or(Value::Null);
      let (last_result, error) = match self.executor.run(&node.code, &input).await {
        Ok(output) => (output.value, None),
        Err(e) => (None, Some(e.message)),
      };
      info!(node_id = %node.id, failed = error.is_some(), "caller_execution_completed");

      let node_id = node.id.as_str();
      self
        .client
        .mutate(room_id, |doc| {
          // The engine may have given up and cleared the marker meanwhile.
          if let Some(node) = doc.node_mut(node_id).filter(|n| n.pending_caller_execution) {
            node.last_result = last_result.clone();
            node.error = error.clone();
            node.is_executing = false;
            node.pending_caller_execution = false;
            node.caller_input = None;
          }
        })
        .await;
    }

    Ok(pending.len())
  }

  /// Poll the room until `cancel` fires.
  pub async fn run(&self, room_id: &str, cancel: CancellationToken) {
    info!(room_id = %room_id, "caller worker started");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!(room_id = %room_id, "caller worker cancelled");
          break;
        }
        _ = tokio::time::sleep(self.poll_interval) => {
          if let Err(e) = self.process_pending(room_id).await {
            warn!(room_id = %room_id, error = %e, "caller worker poll failed");
          }
        }
      }
    }
  }
}

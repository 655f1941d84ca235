//! Execution events and notifiers for observability.
//!
//! Events are emitted while nodes and flows run so that consumers (the CLI's
//! progress output, a UI stream) can follow along without reading shared
//! state.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during execution.
///
/// `execution_id` is absent for single-node executions, which have no
/// history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  FlowStarted {
    execution_id: String,
    room_id: String,
    start_node_id: String,
  },

  NodeStarted {
    execution_id: Option<String>,
    node_id: String,
  },

  NodeCompleted {
    execution_id: Option<String>,
    node_id: String,
    result: Option<serde_json::Value>,
  },

  NodeFailed {
    execution_id: Option<String>,
    node_id: String,
    error: String,
  },

  FlowCompleted {
    execution_id: String,
    success: bool,
    nodes_executed: usize,
  },
}

/// Receives execution events.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a run.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

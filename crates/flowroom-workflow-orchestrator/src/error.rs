//! Orchestrator errors.

use flowroom_store::StoreError;
use flowroom_task_runtime::ScriptError;

/// Errors that abort an orchestrator operation before it runs anything.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
  #[error("{message}")]
  Validation { message: String },

  #[error("room '{room_id}' not found")]
  RoomNotFound { room_id: String },

  #[error("node '{node_id}' not found in room '{room_id}'")]
  NodeNotFound { room_id: String, node_id: String },

  /// The room could not be read when the operation started.
  #[error("failed to read room '{room_id}'")]
  Store {
    room_id: String,
    #[source]
    source: StoreError,
  },
}

impl OrchestratorError {
  pub(crate) fn from_store(room_id: &str, source: StoreError) -> Self {
    if source.is_not_found() {
      OrchestratorError::RoomNotFound {
        room_id: room_id.to_string(),
      }
    } else {
      OrchestratorError::Store {
        room_id: room_id.to_string(),
        source,
      }
    }
  }
}

/// Failure of a single node dispatch. Recorded as the node's error; never
/// aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  #[error(transparent)]
  Script(#[from] ScriptError),

  #[error("caller execution timed out after {timeout_ms}ms")]
  CallerTimeout { timeout_ms: u128 },

  #[error("node {node_id} was removed while awaiting caller execution")]
  NodeRemoved { node_id: String },
}

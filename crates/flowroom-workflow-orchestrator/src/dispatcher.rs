use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flowroom_config::{ExecutionLocation, Node, NodeExecutionResult};
use flowroom_store::SharedStateClient;
use flowroom_task_runtime::{ScriptError, ScriptExecutor};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::DispatchError;

type CallerSlot = (String, String);

/// Runs a node wherever its execution location says, and keeps the node's
/// live state in shared state current while doing so.
pub struct LocationDispatcher {
  client: SharedStateClient,
  executor: Arc<dyn ScriptExecutor>,
  poll_interval: Duration,
  caller_timeout: Duration,
  // A node has a single pending-caller slot, so concurrent caller dispatches
  // of the same node must not overlap.
  caller_slots: Mutex<HashMap<CallerSlot, Arc<Mutex<()>>>>,
}

impl LocationDispatcher {
  pub fn new(
    client: SharedStateClient,
    executor: Arc<dyn ScriptExecutor>,
    poll_interval: Duration,
    caller_timeout: Duration,
  ) -> Self {
    Self {
      client,
      executor,
      poll_interval,
      caller_timeout,
      caller_slots: Mutex::new(HashMap::new()),
    }
  }

  /// Execute `node` with `input`. Failures are folded into the returned
  /// result; this never errors.
  #[instrument(
    name = "dispatch",
    skip(self, node, input),
    fields(room_id = %room_id, node_id = %node.id, location = ?node.execution_location)
  )]
  pub async fn dispatch(&self, room_id: &str, node: &Node, input: &Value) -> NodeExecutionResult {
    let outcome = match node.execution_location {
      ExecutionLocation::Backend => self.dispatch_backend(room_id, node, input).await,
      ExecutionLocation::Caller => self.dispatch_caller(room_id, node, input).await,
    };

    match outcome {
      Ok(value) => NodeExecutionResult::success(&node.id, &node.label, value),
      Err(e) => NodeExecutionResult::failure(&node.id, &node.label, e.to_string()),
    }
  }

  async fn dispatch_backend(
    &self,
    room_id: &str,
    node: &Node,
    input: &Value,
  ) -> Result<Option<Value>, DispatchError> {
    let node_id = node.id.as_str();
    self
      .client
      .mutate(room_id, |doc| {
        if let Some(node) = doc.node_mut(node_id) {
          node.is_executing = true;
          node.error = None;
        }
      })
      .await;

    let outcome = self
      .executor
      .run(&node.code, input)
      .await
      .map(|output| output.value);

    let (last_result, error) = match &outcome {
      Ok(value) => (value.clone(), None),
      Err(e) => (None, Some(e.message.clone())),
    };
    self
      .client
      .mutate(room_id, |doc| {
        if let Some(node) = doc.node_mut(node_id) {
          node.is_executing = false;
          node.last_result = last_result.clone();
          node.error = error.clone();
        }
      })
      .await;

    Ok(outcome?)
  }

  async fn dispatch_caller(
    &self,
    room_id: &str,
    node: &Node,
    input: &Value,
  ) -> Result<Option<Value>, DispatchError> {
    let key = (room_id.to_string(), node.id.clone());
    let slot = self.caller_slot(&key).await;

    let outcome = {
      let _guard = slot.clone().lock_owned().await;
      self.await_caller(room_id, node, input).await
    };

    self.release_caller_slot(&key, slot).await;
    outcome
  }

  async fn await_caller(
    &self,
    room_id: &str,
    node: &Node,
    input: &Value,
  ) -> Result<Option<Value>, DispatchError> {
    let node_id = node.id.as_str();

    self
      .client
      .mutate(room_id, |doc| {
        if let Some(node) = doc.node_mut(node_id) {
          node.is_executing = true;
          node.pending_caller_execution = true;
          node.caller_input = Some(input.clone());
          node.error = None;
        }
      })
      .await;
    debug!("awaiting caller execution");

    let deadline = Instant::now() + self.caller_timeout;
    loop {
      let now = Instant::now();
      if now >= deadline {
        break;
      }
      tokio::time::sleep_until((now + self.poll_interval).min(deadline)).await;

      match self.client.snapshot(room_id).await {
        Ok(doc) => match doc.node(node_id) {
          None => {
            return Err(DispatchError::NodeRemoved {
              node_id: node_id.to_string(),
            });
          }
          Some(current) if !current.pending_caller_execution => {
            return match &current.error {
              Some(message) => Err(ScriptError::new(message.clone()).into()),
              None => Ok(current.last_result.clone()),
            };
          }
          Some(_) => {}
        },
        Err(e) => {
          warn!(error = %e, "failed to poll caller execution");
        }
      }
    }

    let err = DispatchError::CallerTimeout {
      timeout_ms: self.caller_timeout.as_millis(),
    };
    let message = err.to_string();
    self
      .client
      .mutate(room_id, |doc| {
        if let Some(node) = doc.node_mut(node_id) {
          node.is_executing = false;
          node.pending_caller_execution = false;
          node.caller_input = None;
          node.error = Some(message.clone());
        }
      })
      .await;

    Err(err)
  }

  async fn caller_slot(&self, key: &CallerSlot) -> Arc<Mutex<()>> {
    let mut slots = self.caller_slots.lock().await;
    slots.entry(key.clone()).or_default().clone()
  }

  /// Drop the slot for `key` once no other dispatch holds or waits on it.
  async fn release_caller_slot(&self, key: &CallerSlot, slot: Arc<Mutex<()>>) {
    let mut slots = self.caller_slots.lock().await;
    drop(slot);
    if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
      slots.remove(key);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use flowroom_config::RoomDocument;
  use flowroom_store::InMemoryStore;
  use flowroom_task_runtime::ScriptOutput;

  struct Echo;

  #[async_trait]
  impl ScriptExecutor for Echo {
    async fn run(&self, _code: &str, input: &Value) -> Result<ScriptOutput, ScriptError> {
      Ok(ScriptOutput::new(Some(input.clone())))
    }
  }

  async fn dispatcher(node: Node) -> LocationDispatcher {
    let store = Arc::new(InMemoryStore::new());
    let mut doc = RoomDocument::default();
    doc.insert_node(node);
    store.insert_room("room", doc).await;

    LocationDispatcher::new(
      SharedStateClient::new(store),
      Arc::new(Echo),
      Duration::from_millis(5),
      Duration::from_millis(30),
    )
  }

  #[tokio::test]
  async fn test_caller_slots_are_released() {
    let node = Node::new("a", "A", "return input").with_location(ExecutionLocation::Caller);
    let dispatcher = dispatcher(node.clone()).await;

    let one = Value::from(1);
    let two = Value::from(2);
    let (first, second) = tokio::join!(
      dispatcher.dispatch("room", &node, &one),
      dispatcher.dispatch("room", &node, &two),
    );

    assert!(first.is_error());
    assert!(second.is_error());
    assert!(dispatcher.caller_slots.lock().await.is_empty());
  }

  #[tokio::test]
  async fn test_backend_dispatch_takes_no_slot() {
    let node = Node::new("a", "A", "return input");
    let dispatcher = dispatcher(node.clone()).await;

    let result = dispatcher.dispatch("room", &node, &Value::from(7)).await;

    assert_eq!(result.result, Some(Value::from(7)));
    assert!(dispatcher.caller_slots.lock().await.is_empty());
  }
}

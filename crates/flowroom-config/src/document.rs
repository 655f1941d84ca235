use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::edge::Edge;
use crate::execution::{ExecutionRecord, ExecutionUpdate};
use crate::node::Node;

/// The shared document backing one room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocument {
  #[serde(default)]
  pub nodes: HashMap<String, Node>,
  #[serde(default)]
  pub edges: Vec<Edge>,
  /// Newest first.
  #[serde(default)]
  pub execution_history: Vec<ExecutionRecord>,
}

impl RoomDocument {
  pub fn node(&self, node_id: &str) -> Option<&Node> {
    self.nodes.get(node_id)
  }

  pub fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
    self.nodes.get_mut(node_id)
  }

  /// Insert a node, keyed by its id.
  pub fn insert_node(&mut self, node: Node) {
    self.nodes.insert(node.id.clone(), node);
  }

  /// Put a record at the head of the history and keep at most `limit` entries.
  pub fn push_execution(&mut self, record: ExecutionRecord, limit: usize) {
    self.execution_history.insert(0, record);
    self.execution_history.truncate(limit);
  }

  /// Merge `update` into the record with the given id. Returns false when
  /// no such record exists.
  pub fn update_execution(&mut self, execution_id: &str, update: &ExecutionUpdate) -> bool {
    match self
      .execution_history
      .iter_mut()
      .find(|record| record.id == execution_id)
    {
      Some(record) => {
        record.merge(update);
        true
      }
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ExecutionStatus;

  #[test]
  fn test_push_execution_trims_oldest() {
    let mut doc = RoomDocument::default();
    for i in 0..55 {
      doc.push_execution(ExecutionRecord::started(format!("exec-{i}"), "a", "A"), 50);
    }

    assert_eq!(doc.execution_history.len(), 50);
    assert_eq!(doc.execution_history[0].id, "exec-54");
    assert_eq!(doc.execution_history[49].id, "exec-5");
  }

  #[test]
  fn test_update_unknown_execution() {
    let mut doc = RoomDocument::default();
    let update = ExecutionUpdate::finished(ExecutionStatus::Success, &[]);
    assert!(!doc.update_execution("missing", &update));
  }

  #[test]
  fn test_document_deserializes_from_backend_json() {
    let doc: RoomDocument = serde_json::from_value(serde_json::json!({
      "nodes": {
        "a": { "id": "a", "label": "A", "code": "return 1" }
      },
      "edges": [ { "id": "e1", "source": "a", "target": "b", "sourceHandle": "out" } ]
    }))
    .unwrap();

    assert_eq!(doc.node("a").map(|n| n.label.as_str()), Some("A"));
    assert_eq!(doc.edges[0].source_handle, Some(serde_json::json!("out")));
    assert!(doc.execution_history.is_empty());
  }
}

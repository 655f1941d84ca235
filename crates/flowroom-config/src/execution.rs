//! Execution history types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a flow execution.
///
/// `Running` moves to exactly one terminal value and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
  Running,
  Success,
  Error,
}

impl ExecutionStatus {
  pub fn is_terminal(self) -> bool {
    !matches!(self, ExecutionStatus::Running)
  }
}

/// Outcome of one node execution within a run.
///
/// Exactly one of `result` / `error` is meaningful. A successful node whose
/// script returned nothing has neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
  pub node_id: String,
  pub node_label: String,
  /// `Some(Value::Null)` when the script returned `null`, `None` when it
  /// returned nothing.
  #[serde(
    default,
    deserialize_with = "crate::nullable::present",
    skip_serializing_if = "Option::is_none"
  )]
  pub result: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl NodeExecutionResult {
  pub fn success(
    node_id: impl Into<String>,
    node_label: impl Into<String>,
    result: Option<serde_json::Value>,
  ) -> Self {
    Self {
      node_id: node_id.into(),
      node_label: node_label.into(),
      result,
      error: None,
    }
  }

  pub fn failure(
    node_id: impl Into<String>,
    node_label: impl Into<String>,
    error: impl Into<String>,
  ) -> Self {
    Self {
      node_id: node_id.into(),
      node_label: node_label.into(),
      result: None,
      error: Some(error.into()),
    }
  }

  pub fn is_error(&self) -> bool {
    self.error.is_some()
  }

  /// The value handed to children, if this result propagates at all.
  ///
  /// Errors, missing values, and `null` all stop a branch.
  pub fn propagated_value(&self) -> Option<&serde_json::Value> {
    if self.is_error() {
      return None;
    }
    self.result.as_ref().filter(|value| !value.is_null())
  }
}

/// The audit trail of one traversal run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
  pub id: String,
  pub start_node_id: String,
  #[serde(default)]
  pub start_node_label: String,
  pub started_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_at: Option<DateTime<Utc>>,
  pub status: ExecutionStatus,
  #[serde(default)]
  pub nodes_executed: usize,
  #[serde(default)]
  pub results: Vec<NodeExecutionResult>,
}

impl ExecutionRecord {
  /// A fresh `running` record with no results.
  pub fn started(
    id: impl Into<String>,
    start_node_id: impl Into<String>,
    start_node_label: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      start_node_id: start_node_id.into(),
      start_node_label: start_node_label.into(),
      started_at: Utc::now(),
      completed_at: None,
      status: ExecutionStatus::Running,
      nodes_executed: 0,
      results: Vec::new(),
    }
  }

  /// Merge a partial update into this record.
  ///
  /// A terminal status is never replaced, and results never shrink.
  pub fn merge(&mut self, update: &ExecutionUpdate) {
    if let Some(nodes_executed) = update.nodes_executed {
      self.nodes_executed = self.nodes_executed.max(nodes_executed);
    }
    if let Some(results) = &update.results {
      if results.len() >= self.results.len() {
        self.results = results.clone();
      }
    }
    if let Some(completed_at) = update.completed_at {
      if self.completed_at.is_none() {
        self.completed_at = Some(completed_at);
      }
    }
    if let Some(status) = update.status {
      if !self.status.is_terminal() {
        self.status = status;
      }
    }
  }
}

/// Partial update applied to an [`ExecutionRecord`] by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionUpdate {
  pub nodes_executed: Option<usize>,
  pub results: Option<Vec<NodeExecutionResult>>,
  pub completed_at: Option<DateTime<Utc>>,
  pub status: Option<ExecutionStatus>,
}

impl ExecutionUpdate {
  /// Progress update carrying the results collected so far.
  pub fn progress(results: &[NodeExecutionResult]) -> Self {
    Self {
      nodes_executed: Some(results.len()),
      results: Some(results.to_vec()),
      ..Default::default()
    }
  }

  /// Final update with terminal status and completion time.
  pub fn finished(status: ExecutionStatus, results: &[NodeExecutionResult]) -> Self {
    Self {
      nodes_executed: Some(results.len()),
      results: Some(results.to_vec()),
      completed_at: Some(Utc::now()),
      status: Some(status),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_null_result_is_kept_apart_from_no_result() {
    let null: NodeExecutionResult =
      serde_json::from_value(json!({"nodeId": "a", "nodeLabel": "A", "result": null})).unwrap();
    assert_eq!(null.result, Some(serde_json::Value::Null));
    assert_eq!(serde_json::to_value(&null).unwrap()["result"], json!(null));

    let absent: NodeExecutionResult =
      serde_json::from_value(json!({"nodeId": "a", "nodeLabel": "A"})).unwrap();
    assert_eq!(absent.result, None);
    assert!(serde_json::to_value(&absent).unwrap().get("result").is_none());
  }

  #[test]
  fn test_terminal_status_is_never_reverted() {
    let mut record = ExecutionRecord::started("exec-1", "a", "A");
    record.merge(&ExecutionUpdate::finished(ExecutionStatus::Error, &[]));
    assert_eq!(record.status, ExecutionStatus::Error);

    record.merge(&ExecutionUpdate {
      status: Some(ExecutionStatus::Running),
      ..Default::default()
    });
    assert_eq!(record.status, ExecutionStatus::Error);

    record.merge(&ExecutionUpdate {
      status: Some(ExecutionStatus::Success),
      ..Default::default()
    });
    assert_eq!(record.status, ExecutionStatus::Error);
  }

  #[test]
  fn test_results_never_shrink() {
    let mut record = ExecutionRecord::started("exec-1", "a", "A");
    let results = vec![
      NodeExecutionResult::success("a", "A", Some(json!(1))),
      NodeExecutionResult::success("b", "B", Some(json!(2))),
    ];
    record.merge(&ExecutionUpdate::progress(&results));
    record.merge(&ExecutionUpdate::progress(&results[..1]));

    assert_eq!(record.results.len(), 2);
    assert_eq!(record.nodes_executed, 2);
  }

  #[test]
  fn test_propagated_value() {
    assert_eq!(
      NodeExecutionResult::success("a", "A", Some(json!({"v": 1}))).propagated_value(),
      Some(&json!({"v": 1}))
    );
    assert!(NodeExecutionResult::success("a", "A", None).propagated_value().is_none());
    assert!(
      NodeExecutionResult::success("a", "A", Some(serde_json::Value::Null))
        .propagated_value()
        .is_none()
    );
    assert!(NodeExecutionResult::failure("a", "A", "boom").propagated_value().is_none());
  }

  #[test]
  fn test_failure_serializes_without_result() {
    let value = serde_json::to_value(NodeExecutionResult::failure("a", "A", "boom")).unwrap();
    assert_eq!(value, json!({"nodeId": "a", "nodeLabel": "A", "error": "boom"}));
  }
}

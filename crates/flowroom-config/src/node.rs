use serde::{Deserialize, Serialize};

/// Where a node's script is evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLocation {
  /// Evaluated by the engine's own sandbox.
  #[default]
  Backend,
  /// Evaluated by the caller's process, handed off through shared state.
  Caller,
}

/// A unit of work holding a script and its last execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
  pub id: String,
  /// Canvas layout. Never interpreted by the engine.
  #[serde(default)]
  pub position: serde_json::Value,
  #[serde(default)]
  pub label: String,
  #[serde(default)]
  pub code: String,
  #[serde(default)]
  pub execution_location: ExecutionLocation,
  #[serde(
    default,
    deserialize_with = "crate::nullable::present",
    skip_serializing_if = "Option::is_none"
  )]
  pub last_result: Option<serde_json::Value>,
  #[serde(default)]
  pub is_executing: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub pending_caller_execution: bool,
  /// Serialized input for a caller-mode execution. Only present while
  /// `pending_caller_execution` is set.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub caller_input: Option<serde_json::Value>,
}

impl Node {
  /// Create a backend node with the given script.
  pub fn new(id: impl Into<String>, label: impl Into<String>, code: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      position: serde_json::Value::Null,
      label: label.into(),
      code: code.into(),
      execution_location: ExecutionLocation::Backend,
      last_result: None,
      is_executing: false,
      error: None,
      pending_caller_execution: false,
      caller_input: None,
    }
  }

  /// Set the execution location.
  pub fn with_location(mut self, location: ExecutionLocation) -> Self {
    self.execution_location = location;
    self
  }
}

use serde::{Deserialize, Serialize};

/// A directed data-flow link from one node's output to another node's input.
///
/// The handle tags identify connection points on the canvas and are opaque
/// to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
  pub id: String,
  pub source: String,
  pub target: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_handle: Option<serde_json::Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target_handle: Option<serde_json::Value>,
}

impl Edge {
  pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      source: source.into(),
      target: target.into(),
      source_handle: None,
      target_handle: None,
    }
  }
}

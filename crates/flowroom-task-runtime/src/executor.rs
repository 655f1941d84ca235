use async_trait::async_trait;

use crate::error::ScriptError;

/// What a script produced after the JSON round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
  /// `None` when the script returned nothing representable.
  pub value: Option<serde_json::Value>,
}

impl ScriptOutput {
  pub fn new(value: Option<serde_json::Value>) -> Self {
    Self { value }
  }
}

/// Evaluates node scripts in an isolated context.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
  /// Run `code` with `input` bound and return its result.
  async fn run(&self, code: &str, input: &serde_json::Value) -> Result<ScriptOutput, ScriptError>;
}

/// A script threw, was rejected by the sandbox, or ran out of time.
///
/// The message is what gets recorded on the node and in the run history.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
  pub message: String,
}

impl ScriptError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

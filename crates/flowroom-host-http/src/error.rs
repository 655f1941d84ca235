use thiserror::Error;

/// Errors surfaced to a script calling `fetch`.
#[derive(Debug, Error)]
pub enum HttpError {
  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  #[error("request blocked by policy: {message}")]
  PolicyViolation { message: String },

  #[error("unsupported HTTP method: {0}")]
  InvalidMethod(String),

  #[error("invalid header '{name}'")]
  InvalidHeader { name: String },

  #[error("response exceeded {limit} bytes")]
  ResponseTooLarge { limit: usize },

  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
}

impl HttpError {
  pub fn policy(message: impl Into<String>) -> Self {
    Self::PolicyViolation {
      message: message.into(),
    }
  }
}

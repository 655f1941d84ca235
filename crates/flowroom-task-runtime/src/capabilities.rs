use std::sync::Arc;

use flowroom_host_http::{HttpClient, HttpError, HttpPolicy};

/// Host capabilities a script executor may expose to scripts.
///
/// Currently just outbound HTTP. Anything not in here is unreachable from
/// inside a script.
#[derive(Debug, Clone)]
pub struct Capabilities {
  pub http: Arc<HttpClient>,
}

impl Capabilities {
  pub fn new(http: HttpClient) -> Self {
    Self {
      http: Arc::new(http),
    }
  }

  /// Capabilities with the given HTTP policy.
  pub fn with_http_policy(policy: HttpPolicy) -> Result<Self, HttpError> {
    Ok(Self::new(HttpClient::new(policy)?))
  }
}

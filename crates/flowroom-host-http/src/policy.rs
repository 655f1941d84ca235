use std::time::Duration;

use url::Url;

use crate::error::HttpError;

/// Rules applied to every outbound request a script makes.
#[derive(Debug, Clone)]
pub struct HttpPolicy {
  /// URL schemes scripts may use.
  pub allowed_schemes: Vec<String>,
  /// When set, only these hosts (exact match, case-insensitive) are reachable.
  pub allowed_hosts: Option<Vec<String>>,
  /// Per-request timeout.
  pub timeout: Duration,
  /// Maximum response body size in bytes.
  pub max_response_bytes: usize,
}

impl Default for HttpPolicy {
  fn default() -> Self {
    Self {
      allowed_schemes: vec!["http".to_string(), "https".to_string()],
      allowed_hosts: None,
      timeout: Duration::from_secs(10),
      max_response_bytes: 5 * 1024 * 1024,
    }
  }
}

impl HttpPolicy {
  /// Parse `raw` and check it against the policy.
  pub fn check(&self, raw: &str) -> Result<Url, HttpError> {
    let url = Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
      url: raw.to_string(),
      message: e.to_string(),
    })?;
    self.permits(&url)?;
    Ok(url)
  }

  /// Check an already-parsed URL against the policy.
  pub fn permits(&self, url: &Url) -> Result<(), HttpError> {
    if !self
      .allowed_schemes
      .iter()
      .any(|scheme| scheme.eq_ignore_ascii_case(url.scheme()))
    {
      return Err(HttpError::policy(format!(
        "scheme '{}' is not allowed",
        url.scheme()
      )));
    }

    let Some(host) = url.host_str() else {
      return Err(HttpError::policy("url has no host"));
    };

    if let Some(allowed) = &self.allowed_hosts {
      if !allowed.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return Err(HttpError::policy(format!("host '{}' is not allowed", host)));
      }
    }

    Ok(())
  }
}

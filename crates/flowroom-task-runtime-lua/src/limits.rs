use std::time::Duration;

/// Resource limits for one script invocation.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
  /// Wall-clock budget covering CPU time and awaited I/O.
  pub timeout: Duration,
  /// Upper bound on Lua heap usage, in bytes.
  pub memory_limit: Option<usize>,
  /// How many VM instructions run between deadline checks.
  pub hook_interval: u32,
}

impl Default for SandboxLimits {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(5),
      memory_limit: Some(64 * 1024 * 1024),
      hook_interval: 1000,
    }
  }
}

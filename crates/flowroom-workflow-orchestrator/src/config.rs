use std::time::Duration;

/// How a run treats a node it has already executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TraversalPolicy {
  /// Nodes may run again whenever a path reaches them; only the budget caps
  /// stop a cycle.
  #[default]
  CycleTolerant,
  /// A node runs at most once per run.
  VisitOnce,
}

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
  /// Maximum executions of a single node within one run.
  pub per_node_cap: usize,
  /// Maximum executions of all nodes within one run.
  pub global_cap: usize,
  /// Number of execution records kept in a room's history.
  pub history_limit: usize,
  /// How often shared state is polled while a caller-mode node runs.
  pub caller_poll_interval: Duration,
  /// How long to wait for the caller before giving up on a node.
  pub caller_timeout: Duration,
  pub traversal_policy: TraversalPolicy,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      per_node_cap: 10,
      global_cap: 100,
      history_limit: 50,
      caller_poll_interval: Duration::from_millis(500),
      caller_timeout: Duration::from_secs(60),
      traversal_policy: TraversalPolicy::CycleTolerant,
    }
  }
}

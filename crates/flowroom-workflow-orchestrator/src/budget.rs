use std::collections::HashMap;

use crate::config::{OrchestratorConfig, TraversalPolicy};

/// Why the budget refused a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStop {
  GlobalCap,
  NodeCap,
  AlreadyVisited,
}

/// Execution counters for one run.
///
/// Shared by every branch of the run, so a cycle reached through several
/// paths still counts against the same caps.
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
  per_node_cap: usize,
  global_cap: usize,
  policy: TraversalPolicy,
  total: usize,
  per_node: HashMap<String, usize>,
}

impl ExecutionBudget {
  pub fn new(per_node_cap: usize, global_cap: usize, policy: TraversalPolicy) -> Self {
    Self {
      per_node_cap,
      global_cap,
      policy,
      total: 0,
      per_node: HashMap::new(),
    }
  }

  pub fn from_config(config: &OrchestratorConfig) -> Self {
    Self::new(config.per_node_cap, config.global_cap, config.traversal_policy)
  }

  /// Reserve one execution of `node_id`, counting it on success.
  pub fn try_acquire(&mut self, node_id: &str) -> Result<(), BudgetStop> {
    if self.total >= self.global_cap {
      return Err(BudgetStop::GlobalCap);
    }
    let count = self.count_for(node_id);
    if count >= self.per_node_cap {
      return Err(BudgetStop::NodeCap);
    }
    if self.policy == TraversalPolicy::VisitOnce && count > 0 {
      return Err(BudgetStop::AlreadyVisited);
    }

    self.total += 1;
    *self.per_node.entry(node_id.to_string()).or_default() += 1;
    Ok(())
  }

  pub fn count_for(&self, node_id: &str) -> usize {
    self.per_node.get(node_id).copied().unwrap_or(0)
  }

  pub fn total(&self) -> usize {
    self.total
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_node_cap() {
    let mut budget = ExecutionBudget::new(2, 100, TraversalPolicy::CycleTolerant);
    assert!(budget.try_acquire("a").is_ok());
    assert!(budget.try_acquire("a").is_ok());
    assert_eq!(budget.try_acquire("a"), Err(BudgetStop::NodeCap));
    assert!(budget.try_acquire("b").is_ok());
    assert_eq!(budget.total(), 3);
    assert_eq!(budget.count_for("a"), 2);
  }

  #[test]
  fn test_global_cap_checked_first() {
    let mut budget = ExecutionBudget::new(1, 2, TraversalPolicy::CycleTolerant);
    budget.try_acquire("a").unwrap();
    budget.try_acquire("b").unwrap();
    assert_eq!(budget.try_acquire("a"), Err(BudgetStop::GlobalCap));
    assert_eq!(budget.try_acquire("c"), Err(BudgetStop::GlobalCap));
  }

  #[test]
  fn test_refusal_is_not_counted() {
    let mut budget = ExecutionBudget::new(1, 10, TraversalPolicy::CycleTolerant);
    budget.try_acquire("a").unwrap();
    let _ = budget.try_acquire("a");
    assert_eq!(budget.total(), 1);
  }

  #[test]
  fn test_visit_once() {
    let mut budget = ExecutionBudget::new(10, 100, TraversalPolicy::VisitOnce);
    budget.try_acquire("a").unwrap();
    assert_eq!(budget.try_acquire("a"), Err(BudgetStop::AlreadyVisited));
    assert!(budget.try_acquire("b").is_ok());
  }
}

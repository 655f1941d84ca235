use flowroom_config::Edge;

/// Targets of every edge whose source is `node_id`, in edge order.
pub fn children_of(node_id: &str, edges: &[Edge]) -> Vec<String> {
  edges
    .iter()
    .filter(|edge| edge.source == node_id)
    .map(|edge| edge.target.clone())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
    pairs
      .iter()
      .enumerate()
      .map(|(i, (from, to))| Edge::new(format!("e{i}"), *from, *to))
      .collect()
  }

  #[test]
  fn test_children_in_edge_order() {
    let edges = edges(&[("a", "c"), ("b", "x"), ("a", "b"), ("a", "d")]);
    assert_eq!(children_of("a", &edges), vec!["c", "b", "d"]);
  }

  #[test]
  fn test_unknown_node_has_no_children() {
    let edges = edges(&[("a", "b")]);

    assert!(children_of("zzz", &edges).is_empty());
    assert!(children_of("b", &edges).is_empty());
    assert!(children_of("zzz", &[]).is_empty());
  }

  #[test]
  fn test_cycles_and_duplicates_are_kept() {
    let edges = edges(&[("a", "b"), ("b", "a"), ("a", "b")]);

    assert_eq!(children_of("a", &edges), vec!["b", "b"]);
    assert_eq!(children_of("b", &edges), vec!["a"]);
  }

  #[test]
  fn test_edges_to_missing_nodes_are_not_validated() {
    let edges = edges(&[("a", "ghost")]);
    assert_eq!(children_of("a", &edges), vec!["ghost"]);
  }
}

//! Tests for `DependencyGraph`.

use super::DependencyGraph;
use crate::dependency_graph::RETIRED_FLOOR;
use tokio_test::{assert_pending, assert_ready, task};

#[test]
fn pushed_edges_are_reachable() {
  let g = DependencyGraph::new();
  g.push("", "a");
  g.push("a", "b");
  assert!(g.has(&"", &"a"));
  assert!(g.has(&"a", &"b"));
  assert!(g.has(&"", &"b"));
  assert!(g.has(&"a", &"a"));
  assert!(!g.has(&"b", &"a"));
  assert_eq!(g.len(), 2);
}

#[test]
fn popped_nodes_are_no_longer_reachable() {
  let g = DependencyGraph::new();
  g.push("", "a");
  g.push("a", "b");
  assert!(g.pop(&"b", &"b"));
  assert!(!g.has(&"a", &"b"));
  // b is gone; addressing it as a stem goes through its head, a.
  assert!(g.pop(&"b", &"a"));
  assert!(!g.has(&"", &"a"));
  assert!(g.is_empty());
}

#[test]
fn pop_requires_adjacency() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  g.push("b", "c");
  assert!(!g.pop(&"a", &"c"));
  assert!(!g.pop(&"", &"b"));
  assert!(g.pop(&"", &"a"));
  assert!(g.contains(&"b"));
}

#[test]
fn zero_self_and_duplicate_edges_only_register() {
  let g = DependencyGraph::new();
  g.push("a", "a");
  g.push("", "b");
  g.push("b", "");
  assert!(g.stems(&"a").is_empty());
  assert!(g.stems(&"b").is_empty());
  g.push("a", "b");
  g.push("a", "b");
  assert_eq!(g.leaves(&"a"), vec!["b"]);
  assert_eq!(g.stems(&"b"), vec!["a"]);
  assert_eq!(g.len(), 2);
}

#[test]
fn removing_a_middle_node_relinks_its_leaves() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  g.push("b", "c");
  g.push("b", "d");
  assert!(g.pop(&"a", &"b"));
  assert_eq!(g.stems(&"c"), vec!["a"]);
  assert_eq!(g.stems(&"d"), vec!["a"]);
  assert!(g.has(&"a", &"c"));
  assert!(g.has(&"b", &"d"));
}

#[test]
fn clear_compacts_an_emptied_branch() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  g.push("b", "c");
  assert_eq!(g.clear(&"c"), 3);
  assert!(!g.has(&"", &"a"));
  assert!(g.is_empty());
}

#[test]
fn clear_keeps_ancestors_with_other_leaves() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  g.push("a", "c");
  assert_eq!(g.clear(&"b"), 1);
  assert!(g.contains(&"a"));
  assert!(g.has(&"a", &"c"));
  assert_eq!(g.clear(&"c"), 2);
  assert!(g.is_empty());
}

#[test]
fn clear_of_unknown_node_removes_nothing() {
  let g: DependencyGraph<&str> = DependencyGraph::new();
  assert_eq!(g.clear(&"missing"), 0);
}

#[test]
fn done_fires_when_node_is_removed() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  let signal = g.done(&"b");
  let mut wait = task::spawn(signal.wait());
  assert_pending!(wait.poll());
  // Removing the stem leaves b as a root.
  assert!(g.pop(&"", &"a"));
  assert_pending!(wait.poll());
  assert!(g.pop(&"", &"b"));
  assert!(wait.is_woken());
  assert_ready!(wait.poll());
}

#[test]
fn zero_done_fires_only_when_graph_drains() {
  let g = DependencyGraph::new();
  g.push("", "a");
  g.push("a", "b");
  g.push("", "x");
  let signal = g.done(&"");
  let mut wait = task::spawn(signal.wait());
  assert_pending!(wait.poll());

  g.clear(&"b");
  assert!(!signal.is_fired());
  assert_pending!(wait.poll());

  g.clear(&"x");
  assert!(signal.is_fired());
  assert_ready!(wait.poll());
  // Re-requesting on a drained graph is already fired.
  assert!(g.done(&"").is_fired());
}

#[test]
fn done_on_absent_node_is_already_fired() {
  let g: DependencyGraph<u64> = DependencyGraph::new();
  assert!(g.done(&7).is_fired());
  assert!(g.done(&0).is_fired());
}

#[test]
fn close_fires_outstanding_signals() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  let node = g.done(&"b");
  let all = g.done(&"");
  g.close();
  assert!(node.is_fired());
  assert!(all.is_fired());
  assert!(g.is_empty());
}

#[test]
fn registration_after_removal_starts_fresh() {
  let g = DependencyGraph::new();
  g.push("a", "b");
  g.pop(&"a", &"b");
  g.push("", "b");
  assert!(g.stems(&"b").is_empty());
  assert!(g.has(&"b", &"b"));
  assert!(!g.has(&"a", &"b"));
}

#[test]
fn heads_of_removed_nodes_stay_bounded() {
  let g: DependencyGraph<u64> = DependencyGraph::new();
  g.push(0, 1);
  for leaf in 2..10_000u64 {
    g.push(1, leaf);
    assert!(g.pop(&1, &leaf));
  }
  assert_eq!(g.len(), 1);
  assert!(g.retired() <= RETIRED_FLOOR);

  // The most recent removals still resolve to their live ancestor; the
  // oldest are forgotten.
  assert!(g.has(&9_999, &1));
  assert!(!g.has(&2, &1));
  g.push(1, 20_000);
  assert!(g.pop(&9_999, &20_000));
}

#[test]
fn chained_removals_point_at_the_nearest_live_ancestor() {
  let g: DependencyGraph<u64> = DependencyGraph::new();
  g.push(1, 2);
  g.push(2, 3);
  g.push(3, 4);
  assert!(g.pop(&2, &3));
  assert!(g.pop(&1, &2));
  // 3 was headed by 2, which is gone too; both now resolve to 1.
  assert!(g.has(&3, &4));
  assert!(g.pop(&3, &4));
  assert_eq!(g.retired(), 3);
  assert!(g.pop(&4, &1));
  assert_eq!(g.retired(), 0);
}

//! Stem/leaf dependency graph with drain notification.
//!
//! The runtime records which identities depend on which (a leaf depends on
//! its stems) and asks for a [Signal] that fires once an identity, or the
//! whole graph, has drained. `K::default()` is the zero identity: it is never
//! stored and stands for "no stem" / "every root".
//!
//! Removing a node re-links its leaves straight to its stems, so reachability
//! through the removed node survives. A removed node also leaves a head entry
//! pointing at its nearest live ancestor, which lets callers keep addressing
//! it as a stem after it is gone. Head entries are kept for at most as many
//! removed nodes as there are live ones (never fewer than [RETIRED_FLOOR]);
//! the oldest are forgotten first.

use crate::signal::Signal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

/// Removed nodes whose head is kept regardless of how few nodes are live.
pub const RETIRED_FLOOR: usize = 64;

/// Dependency graph over identities `K`.
pub struct DependencyGraph<K> {
  state: Mutex<State<K>>,
}

struct State<K> {
  /// Live node -> its stems. Every live node has an entry here and in `leaves`.
  stems: HashMap<K, Vec<K>>,
  leaves: HashMap<K, Vec<K>>,
  /// Removed node -> its nearest live ancestor. Every value is live.
  heads: HashMap<K, K>,
  /// Keys of `heads` in removal order, oldest first.
  retired: VecDeque<K>,
  /// Pending drain signals by identity, zero included.
  signals: HashMap<K, Signal>,
}

impl<K: Eq + Hash + Clone + Default + Debug> DependencyGraph<K> {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(State {
        stems: HashMap::new(),
        leaves: HashMap::new(),
        heads: HashMap::new(),
        retired: VecDeque::new(),
        signals: HashMap::new(),
      }),
    }
  }

  /// Registers `stem` and `leaf` and records that `leaf` depends on `stem`.
  /// Zero, self-referential and duplicate edges only register the identities.
  #[instrument(level = "trace", skip(self))]
  pub fn push(&self, stem: K, leaf: K) {
    let zero = K::default();
    let mut state = self.lock();
    state.register(&stem);
    state.register(&leaf);
    if stem == zero || leaf == zero || stem == leaf {
      return;
    }
    state.add_edge(stem, leaf);
  }

  /// True if `leaf` is reachable from `stem` following stem-to-leaf edges,
  /// `stem` itself included. A zero `stem` starts from every root.
  pub fn has(&self, stem: &K, leaf: &K) -> bool {
    let state = self.lock();
    if !state.is_live(leaf) {
      return false;
    }
    let start: Vec<K> = if *stem == K::default() {
      state.roots()
    } else {
      match state.head(stem) {
        Some(head) => vec![head],
        None => return false,
      }
    };

    let mut seen: HashSet<K> = start.iter().cloned().collect();
    let mut queue: VecDeque<K> = start.into();
    while let Some(node) = queue.pop_front() {
      if node == *leaf {
        return true;
      }
      for next in state.leaves.get(&node).into_iter().flatten() {
        if seen.insert(next.clone()) {
          queue.push_back(next.clone());
        }
      }
    }
    false
  }

  /// Removes `leaf` if it is `stem`'s head or an immediate leaf of it. A
  /// removed `stem` is addressed through its head. Returns whether a node
  /// was removed.
  #[instrument(level = "trace", skip(self))]
  pub fn pop(&self, stem: &K, leaf: &K) -> bool {
    let mut state = self.lock();
    if !state.is_live(leaf) {
      return false;
    }
    let adjacent = if *stem == K::default() {
      state.stems.get(leaf).is_some_and(Vec::is_empty)
    } else {
      match state.head(stem) {
        Some(head) => {
          head == *leaf || state.leaves.get(&head).is_some_and(|l| l.contains(leaf))
        }
        None => false,
      }
    };
    if !adjacent {
      return false;
    }
    state.remove(leaf);
    true
  }

  /// Removes `leaf`, then every ancestor left without leaves, bottom-up.
  /// Returns how many nodes were removed.
  #[instrument(level = "trace", skip(self))]
  pub fn clear(&self, leaf: &K) -> usize {
    let mut state = self.lock();
    if !state.is_live(leaf) {
      return 0;
    }
    let mut removed = 0;
    let mut queue = VecDeque::from([leaf.clone()]);
    while let Some(node) = queue.pop_front() {
      if !state.is_live(&node) {
        continue;
      }
      let leafless = state.leaves.get(&node).is_none_or(Vec::is_empty);
      if node != *leaf && !leafless {
        continue;
      }
      let stems = state.remove(&node);
      removed += 1;
      queue.extend(stems);
    }
    debug!(removed, "dependency branch cleared");
    removed
  }

  /// Signal fired once `stem` is no longer in the graph, or for the zero
  /// identity once the graph holds no nodes. Already fired if that is true now.
  pub fn done(&self, stem: &K) -> Signal {
    let mut state = self.lock();
    let drained = if *stem == K::default() {
      state.stems.is_empty()
    } else {
      !state.is_live(stem)
    };
    if drained {
      return Signal::fired();
    }
    state.signals.entry(stem.clone()).or_default().clone()
  }

  /// Fires every pending signal and empties the graph.
  pub fn close(&self) {
    let signals = {
      let mut state = self.lock();
      state.stems.clear();
      state.leaves.clear();
      state.heads.clear();
      state.retired.clear();
      std::mem::take(&mut state.signals)
    };
    for signal in signals.into_values() {
      signal.fire();
    }
  }

  pub fn contains(&self, node: &K) -> bool {
    self.lock().is_live(node)
  }

  /// Immediate stems of `node`.
  pub fn stems(&self, node: &K) -> Vec<K> {
    self.lock().stems.get(node).cloned().unwrap_or_default()
  }

  /// Immediate leaves of `node`.
  pub fn leaves(&self, node: &K) -> Vec<K> {
    self.lock().leaves.get(node).cloned().unwrap_or_default()
  }

  pub fn len(&self) -> usize {
    self.lock().stems.len()
  }

  /// Removed nodes that can still be addressed through their head.
  pub fn retired(&self) -> usize {
    self.lock().heads.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().stems.is_empty()
  }

  fn lock(&self) -> MutexGuard<'_, State<K>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<K: Eq + Hash + Clone + Default> State<K> {
  fn is_live(&self, node: &K) -> bool {
    self.stems.contains_key(node)
  }

  fn register(&mut self, node: &K) {
    if *node == K::default() || self.is_live(node) {
      return;
    }
    if self.heads.remove(node).is_some() {
      self.retired.retain(|k| k != node);
    }
    self.stems.insert(node.clone(), Vec::new());
    self.leaves.insert(node.clone(), Vec::new());
  }

  fn add_edge(&mut self, stem: K, leaf: K) {
    let Some(stems) = self.stems.get_mut(&leaf) else {
      return;
    };
    if stems.contains(&stem) {
      return;
    }
    stems.push(stem.clone());
    self.leaves.entry(stem).or_default().push(leaf);
  }

  fn roots(&self) -> Vec<K> {
    self
      .stems
      .iter()
      .filter(|(_, stems)| stems.is_empty())
      .map(|(node, _)| node.clone())
      .collect()
  }

  /// `node` itself if live, else its nearest live ancestor.
  fn head(&self, node: &K) -> Option<K> {
    if self.is_live(node) {
      return Some(node.clone());
    }
    self.heads.get(node).filter(|head| self.is_live(head)).cloned()
  }

  /// Removes a live node, re-linking its leaves to its stems. Returns its stems.
  fn remove(&mut self, node: &K) -> Vec<K> {
    let stems = self.stems.remove(node).unwrap_or_default();
    let leaves = self.leaves.remove(node).unwrap_or_default();
    for stem in &stems {
      if let Some(l) = self.leaves.get_mut(stem) {
        l.retain(|x| x != node);
      }
    }
    for leaf in &leaves {
      if let Some(s) = self.stems.get_mut(leaf) {
        s.retain(|x| x != node);
      }
    }
    for leaf in &leaves {
      for stem in &stems {
        if stem != leaf {
          self.add_edge(stem.clone(), leaf.clone());
        }
      }
    }

    match stems.first() {
      Some(up) => {
        for head in self.heads.values_mut() {
          if head == node {
            *head = up.clone();
          }
        }
        self.heads.insert(node.clone(), up.clone());
        self.retired.push_back(node.clone());
      }
      None => {
        self.heads.retain(|_, head| head != node);
        let heads = &self.heads;
        self.retired.retain(|k| heads.contains_key(k));
      }
    }
    self.forget_oldest_heads();

    if let Some(signal) = self.signals.remove(node) {
      signal.fire();
    }
    if self.stems.is_empty() {
      self.heads.clear();
      self.retired.clear();
      if let Some(signal) = self.signals.remove(&K::default()) {
        signal.fire();
      }
    }
    stems
  }

  fn forget_oldest_heads(&mut self) {
    let limit = self.stems.len().max(RETIRED_FLOOR);
    while self.heads.len() > limit {
      let Some(oldest) = self.retired.pop_front() else {
        break;
      };
      self.heads.remove(&oldest);
    }
  }
}

impl<K: Eq + Hash + Clone + Default + Debug> Default for DependencyGraph<K> {
  fn default() -> Self {
    Self::new()
  }
}

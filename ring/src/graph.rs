//! Dependency edges between registrations.

use std::collections::{HashMap, HashSet};

use crate::core::Key;

/// Directed edges `dependent -> dependency`, indexed both ways.
///
/// Only primary keys are stored here; alias keys are normalized by the registry
/// before they reach the graph.
#[derive(Default)]
pub(crate) struct DependencyGraph {
  dependencies: HashMap<Key, HashSet<Key>>,
  dependents: HashMap<Key, HashSet<Key>>,
}

impl DependencyGraph {
  /// Adds an edge. Returns `false` if it was already present.
  pub(crate) fn bind(&mut self, dependent: &Key, dependency: &Key) -> bool {
    let added = self
      .dependencies
      .entry(dependent.clone())
      .or_default()
      .insert(dependency.clone());
    if added {
      self
        .dependents
        .entry(dependency.clone())
        .or_default()
        .insert(dependent.clone());
    }
    added
  }

  /// Returns `true` if `from` depends on `to`, directly or transitively.
  pub(crate) fn reaches(&self, from: &Key, to: &Key) -> bool {
    let mut stack = vec![from];
    let mut seen = HashSet::new();
    while let Some(key) = stack.pop() {
      if key == to {
        return true;
      }
      if !seen.insert(key) {
        continue;
      }
      if let Some(next) = self.dependencies.get(key) {
        stack.extend(next.iter());
      }
    }
    false
  }

  pub(crate) fn has_dependents(&self, key: &Key) -> bool {
    self.dependents.get(key).is_some_and(|set| !set.is_empty())
  }

  pub(crate) fn dependents_of(&self, key: &Key) -> Vec<Key> {
    sorted(self.dependents.get(key))
  }

  pub(crate) fn dependencies_of(&self, key: &Key) -> Vec<Key> {
    sorted(self.dependencies.get(key))
  }

  /// Drops every edge leaving `key`, releasing the records it depended on.
  pub(crate) fn release(&mut self, key: &Key) {
    let Some(targets) = self.dependencies.remove(key) else {
      return;
    };
    for target in targets {
      if let Some(set) = self.dependents.get_mut(&target) {
        set.remove(key);
        if set.is_empty() {
          self.dependents.remove(&target);
        }
      }
    }
  }

  /// Orders `keys` so that every dependent comes before its dependencies.
  pub(crate) fn teardown_order(&self, keys: Vec<Key>) -> Vec<Key> {
    let members: HashSet<&Key> = keys.iter().collect();
    let mut pending: HashMap<&Key, usize> = keys
      .iter()
      .map(|key| {
        let count = self
          .dependents
          .get(key)
          .map_or(0, |set| set.iter().filter(|d| members.contains(d)).count());
        (key, count)
      })
      .collect();

    let mut ready: Vec<&Key> = keys.iter().filter(|key| pending[key] == 0).collect();
    let mut order = Vec::with_capacity(keys.len());
    let mut placed = HashSet::new();
    while let Some(key) = ready.pop() {
      if !placed.insert(key) {
        continue;
      }
      order.push(key.clone());
      for dependency in self.dependencies.get(key).into_iter().flatten() {
        if let Some(count) = pending.get_mut(dependency) {
          *count -= 1;
          if *count == 0 {
            ready.push(dependency);
          }
        }
      }
    }

    // Edges are kept acyclic, so this only picks up keys unknown to the graph.
    for key in &keys {
      if !placed.contains(key) {
        order.push(key.clone());
      }
    }
    order
  }

  pub(crate) fn clear(&mut self) {
    self.dependencies.clear();
    self.dependents.clear();
  }

  #[cfg(test)]
  pub(crate) fn is_empty(&self) -> bool {
    self.dependencies.is_empty() && self.dependents.is_empty()
  }
}

fn sorted(set: Option<&HashSet<Key>>) -> Vec<Key> {
  let mut keys: Vec<Key> = set.into_iter().flatten().cloned().collect();
  keys.sort_by(|a, b| (a.type_name(), a.tag()).cmp(&(b.type_name(), b.tag())));
  keys
}

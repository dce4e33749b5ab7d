use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::VecDeque;

/// One recorded state mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Dot-separated path of the mutation; empty string for whole-tree
    /// operations (`merge`).
    pub path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Per-run key-path-addressable state tree with a monotonically
/// increasing version counter and bounded change history.
///
/// Exclusively owned by the run's single driving handler for the run's
/// lifetime — no internal locking, no cross-run sharing. Callers never
/// touch the raw tree; every mutation goes through this interface so
/// the version-per-mutation invariant holds.
#[derive(Debug)]
pub struct StateManager {
    root: Value,
    version: u64,
    history: VecDeque<StateChange>,
    history_cap: usize,
}

impl StateManager {
    pub fn new(history_cap: usize) -> Self {
        Self {
            root: Value::Object(Map::new()),
            version: 0,
            history: VecDeque::new(),
            history_cap,
        }
    }

    /// Seed the tree from an initial object without consuming version
    /// numbers. Non-object values are ignored.
    pub fn with_initial(history_cap: usize, initial: Value) -> Self {
        let mut manager = Self::new(history_cap);
        if initial.is_object() {
            manager.root = initial;
        }
        manager
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Value at `path`, or the full tree for `None`.
    pub fn get(&self, path: Option<&str>) -> Option<&Value> {
        match path {
            None | Some("") => Some(&self.root),
            Some(path) => {
                let mut node = &self.root;
                for segment in path.split('.') {
                    node = node.as_object()?.get(segment)?;
                }
                Some(node)
            }
        }
    }

    /// Owned copy of the full tree.
    pub fn snapshot(&self) -> Value {
        self.root.clone()
    }

    /// Replace the subtree at `path`, creating intermediate maps for
    /// missing parents. One version bump.
    pub fn set(&mut self, path: &str, value: Value) {
        let old_value = self.get(Some(path)).cloned();
        let mut node = &mut self.root;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let map = match node {
                Value::Object(map) => map,
                other => {
                    // A scalar in the middle of the path is replaced by
                    // an intermediate map.
                    *other = Value::Object(Map::new());
                    match other {
                        Value::Object(map) => map,
                        _ => unreachable!(),
                    }
                }
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value);
                break;
            }
            node = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        self.record(path.to_string(), old_value, self.get(Some(path)).cloned());
    }

    /// Deep-merge a partial tree into the existing one. One version
    /// bump per call, not per leaf.
    pub fn merge(&mut self, updates: Value) {
        let old_value = Some(self.root.clone());
        deep_merge(&mut self.root, updates);
        self.record(String::new(), old_value, Some(self.root.clone()));
    }

    /// Remove the subtree at `path`. Always counts as one mutation,
    /// even when the path was already absent. Returns the removed
    /// value, if any.
    pub fn delete(&mut self, path: &str) -> Option<Value> {
        let removed = match path.rsplit_once('.') {
            Some((parent, leaf)) => {
                let parent_path = parent.to_string();
                let leaf = leaf.to_string();
                self.get_mut(&parent_path)
                    .and_then(Value::as_object_mut)
                    .and_then(|map| map.remove(&leaf))
            }
            None => self.root.as_object_mut().and_then(|map| map.remove(path)),
        };
        self.record(path.to_string(), removed.clone(), None);
        removed
    }

    /// Most recent changes, newest first.
    pub fn history(&self, limit: usize) -> Vec<&StateChange> {
        self.history.iter().rev().take(limit).collect()
    }

    fn get_mut(&mut self, path: &str) -> Option<&mut Value> {
        if path.is_empty() {
            return Some(&mut self.root);
        }
        let mut node = &mut self.root;
        for segment in path.split('.') {
            node = node.as_object_mut()?.get_mut(segment)?;
        }
        Some(node)
    }

    fn record(&mut self, path: String, old_value: Option<Value>, new_value: Option<Value>) {
        self.version += 1;
        self.history.push_back(StateChange {
            path,
            old_value,
            new_value,
            timestamp: Utc::now(),
        });
        while self.history.len() > self.history_cap {
            self.history.pop_front();
        }
    }
}

fn deep_merge(target: &mut Value, updates: Value) {
    match (target, updates) {
        (Value::Object(target_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                match target_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, updates) => *target = updates,
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

use crate::locks::lock;

/// Thread-safe multiset of group keys.
///
/// Used for per-group counters that are maintained incrementally from
/// state-change notifications. Counts are never recomputed by scanning.
#[derive(Debug, Default)]
pub struct CountingMultiset {
    inner: Mutex<Counts>,
}

#[derive(Debug, Default)]
struct Counts {
    by_key: HashMap<String, usize>,
    total: usize,
}

impl CountingMultiset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `key`.
    pub fn add(&self, key: &str) {
        let mut counts = lock(&self.inner);
        *counts.by_key.entry(key.to_string()).or_default() += 1;
        counts.total += 1;
    }

    /// Remove one occurrence of `key`. Returns false if `key` was absent.
    pub fn remove(&self, key: &str) -> bool {
        let mut counts = lock(&self.inner);
        let Some(count) = counts.by_key.get_mut(key) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            counts.by_key.remove(key);
        }
        counts.total -= 1;
        true
    }

    /// Occurrences of `key`.
    pub fn count(&self, key: &str) -> usize {
        lock(&self.inner).by_key.get(key).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> usize {
        lock(&self.inner).total
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Point-in-time copy of all non-zero counts.
    pub fn snapshot(&self) -> HashMap<String, usize> {
        lock(&self.inner).by_key.clone()
    }
}

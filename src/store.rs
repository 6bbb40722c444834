use std::collections::HashSet;

/// Deduplicating set of scan targets (bare hosts, `host:port`, full URLs).
///
/// Presence-only: keys carry no payload. Inserting the same key twice is a
/// no-op, which guarantees each logical target is probed exactly once.
/// Iteration order is not significant. The sweep is unordered and results
/// are aggregated independently of input order.
#[derive(Debug, Default)]
pub struct TargetStore {
    keys: HashSet<String>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert. Returns `true` if the key was new.
    pub fn add(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    /// Number of unique keys added so far.
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Consume the store, yielding every key once for the sweep.
    pub fn into_keys(self) -> impl Iterator<Item = String> {
        self.keys.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut store = TargetStore::new();
        assert!(store.add("10.0.0.1"));
        assert!(!store.add("10.0.0.1"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn count_matches_distinct_keys() {
        let mut store = TargetStore::new();
        for key in ["a", "b", "a", "c", "b"] {
            store.add(key);
        }
        assert_eq!(store.count(), 3);
        assert_eq!(store.iter().count(), 3);
    }
}

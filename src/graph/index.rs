//! Label-keyed reverse index over entities.
//!
//! `PredicateIndex<K>` answers "which entities carry label L" in O(1) per
//! membership test, insert and remove. Buckets keep members in a `Vec` with a
//! position map and remove by swap, so enumeration order depends only on the
//! sequence of edits and is reproducible run to run.

use std::collections::HashMap;
use std::hash::Hash;

use crate::label::Label;

#[derive(Debug, Clone)]
struct Bucket<K> {
    members: Vec<K>,
    positions: HashMap<K, usize>,
}

impl<K> Default for Bucket<K> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            positions: HashMap::new(),
        }
    }
}

/// Label → set of entities whose world holds that label.
#[derive(Debug, Clone)]
pub struct PredicateIndex<K> {
    buckets: HashMap<Label, Bucket<K>>,
}

impl<K> Default for PredicateIndex<K> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> PredicateIndex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` carries `label`. Returns `false` if already present.
    pub fn insert(&mut self, label: &Label, key: K) -> bool {
        let bucket = self.buckets.entry(label.clone()).or_default();
        if bucket.positions.contains_key(&key) {
            return false;
        }
        bucket.positions.insert(key, bucket.members.len());
        bucket.members.push(key);
        true
    }

    /// Forget that `key` carries `label`. Returns `false` if it was absent.
    pub fn remove(&mut self, label: &Label, key: K) -> bool {
        let Some(bucket) = self.buckets.get_mut(label) else {
            return false;
        };
        let Some(pos) = bucket.positions.remove(&key) else {
            return false;
        };
        bucket.members.swap_remove(pos);
        if let Some(&moved) = bucket.members.get(pos) {
            bucket.positions.insert(moved, pos);
        }
        true
    }

    pub fn contains(&self, label: &Label, key: K) -> bool {
        self.buckets
            .get(label)
            .is_some_and(|b| b.positions.contains_key(&key))
    }

    /// Entities carrying `label`, in index order.
    pub fn members(&self, label: &Label) -> &[K] {
        self.buckets
            .get(label)
            .map(|b| b.members.as_slice())
            .unwrap_or(&[])
    }

    pub fn count(&self, label: &Label) -> usize {
        self.buckets.get(label).map_or(0, |b| b.members.len())
    }

    /// Remove `key` from every bucket it appears in.
    pub fn purge<'a>(&mut self, key: K, labels: impl IntoIterator<Item = &'a Label>) {
        for label in labels {
            self.remove(label, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_remove() {
        let mut idx: PredicateIndex<u32> = PredicateIndex::new();
        let p = Label::new("p");
        assert!(idx.insert(&p, 1));
        assert!(!idx.insert(&p, 1));
        assert!(idx.insert(&p, 2));
        assert!(idx.contains(&p, 1));
        assert_eq!(idx.count(&p), 2);

        assert!(idx.remove(&p, 1));
        assert!(!idx.remove(&p, 1));
        assert_eq!(idx.members(&p), &[2]);
    }

    #[test]
    fn swap_remove_keeps_positions_valid() {
        let mut idx: PredicateIndex<u32> = PredicateIndex::new();
        let p = Label::new("p");
        for k in 0..5 {
            idx.insert(&p, k);
        }
        idx.remove(&p, 1);
        idx.remove(&p, 4);
        for k in [0, 2, 3] {
            assert!(idx.contains(&p, k));
            assert!(idx.remove(&p, k));
        }
        assert!(idx.members(&p).is_empty());
    }

    #[test]
    fn unknown_label_is_empty() {
        let idx: PredicateIndex<u32> = PredicateIndex::new();
        assert!(idx.members(&Label::new("missing")).is_empty());
        assert!(!idx.contains(&Label::new("missing"), 0));
    }

    #[test]
    fn purge_removes_from_all_labels() {
        let mut idx: PredicateIndex<(u32, u32)> = PredicateIndex::new();
        let p = Label::new("p");
        let q = Label::new("q");
        idx.insert(&p, (0, 1));
        idx.insert(&q, (0, 1));
        idx.purge((0, 1), [&p, &q]);
        assert_eq!(idx.count(&p), 0);
        assert_eq!(idx.count(&q), 0);
    }
}

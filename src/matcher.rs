//! Key equivalence policies.
//!
//! A store either indexes its keys structurally (`Hash + Eq`, average O(1)
//! lookup) or through a caller-supplied comparator. A comparator gives no
//! hash or ordering to work with, so a comparator-backed store has to scan
//! every cached key on each lookup: O(n) in the number of live entries.
//! Use it only for keys whose structural equality is too strict, and keep
//! such stores small.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Equivalence predicate for keys that need semantic equality.
///
/// Must behave like an equivalence relation (reflexive, symmetric,
/// transitive), otherwise one logical key may end up with several entries.
pub type KeyComparator<K> = Arc<dyn Fn(&K, &K) -> bool + Send + Sync>;

/// How a store decides that two keys address the same entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMatching {
    /// `Hash + Eq` identity, average O(1) lookup
    Structural,
    /// Caller-supplied comparator, linear scan over all cached keys
    Comparator,
}

/// Key-to-entry mapping used by the store
pub(crate) trait KeyIndex<K, T>: Send {
    fn get(&self, key: &K) -> Option<&T>;

    /// Insert a key the caller has already checked is absent
    fn insert(&mut self, key: K, value: T);

    /// Remove every entry matching `key`, returning the first one found
    fn remove(&mut self, key: &K) -> Option<T>;

    fn values(&self) -> Box<dyn Iterator<Item = &T> + '_>;

    fn len(&self) -> usize;

    fn drain(&mut self) -> Vec<T>;

    fn matching(&self) -> KeyMatching;
}

pub(crate) struct HashIndex<K, T> {
    map: HashMap<K, T>,
}

impl<K, T> HashIndex<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }
}

impl<K, T> KeyIndex<K, T> for HashIndex<K, T>
where
    K: Hash + Eq + Send,
    T: Send,
{
    fn get(&self, key: &K) -> Option<&T> {
        self.map.get(key)
    }

    fn insert(&mut self, key: K, value: T) {
        self.map.insert(key, value);
    }

    fn remove(&mut self, key: &K) -> Option<T> {
        self.map.remove(key)
    }

    fn values(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.map.values())
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn drain(&mut self) -> Vec<T> {
        self.map.drain().map(|(_, value)| value).collect()
    }

    fn matching(&self) -> KeyMatching {
        KeyMatching::Structural
    }
}

pub(crate) struct ScanIndex<K, T> {
    comparator: KeyComparator<K>,
    slots: Vec<(K, T)>,
}

impl<K, T> ScanIndex<K, T> {
    pub(crate) fn new(comparator: KeyComparator<K>) -> Self {
        Self {
            comparator,
            slots: Vec::new(),
        }
    }
}

impl<K, T> KeyIndex<K, T> for ScanIndex<K, T>
where
    K: Send,
    T: Send,
{
    fn get(&self, key: &K) -> Option<&T> {
        self.slots
            .iter()
            .find(|(existing, _)| (self.comparator)(existing, key))
            .map(|(_, value)| value)
    }

    fn insert(&mut self, key: K, value: T) {
        self.slots.push((key, value));
    }

    fn remove(&mut self, key: &K) -> Option<T> {
        let mut removed = None;
        let mut kept = Vec::with_capacity(self.slots.len());
        for (existing, value) in self.slots.drain(..) {
            if (self.comparator)(&existing, key) {
                if removed.is_none() {
                    removed = Some(value);
                }
            } else {
                kept.push((existing, value));
            }
        }
        self.slots = kept;
        removed
    }

    fn values(&self) -> Box<dyn Iterator<Item = &T> + '_> {
        Box::new(self.slots.iter().map(|(_, value)| value))
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn drain(&mut self) -> Vec<T> {
        self.slots.drain(..).map(|(_, value)| value).collect()
    }

    fn matching(&self) -> KeyMatching {
        KeyMatching::Comparator
    }
}

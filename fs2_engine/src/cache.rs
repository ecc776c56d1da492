use std::collections::{HashMap, VecDeque};

use fs2_formats::normalize_name;

/// Session-owned store of decoded assets keyed by normalized name.
///
/// Inserts never overwrite: a second fetch of the same asset carries the same
/// bytes, so the first copy wins. With a capacity the oldest insert is evicted
/// first; without one the cache only grows.
#[derive(Debug, Clone)]
pub struct AssetCache<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl<V> Default for AssetCache<V> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<V> AssetCache<V> {
    pub fn new(capacity: Option<usize>) -> Self {
        AssetCache {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.filter(|&limit| limit > 0),
        }
    }

    /// Returns false when the name was already cached.
    pub fn insert_if_absent(&mut self, name: &str, value: V) -> bool {
        let key = normalize_name(name);
        if self.entries.contains_key(&key) {
            return false;
        }
        if let Some(limit) = self.capacity {
            while self.entries.len() >= limit {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        true
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.entries.get(&normalize_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_wins() {
        let mut cache = AssetCache::default();
        assert!(cache.insert_if_absent("BGM01", 1));
        assert!(!cache.insert_if_absent("bgm01", 2));
        assert_eq!(cache.get("Bgm01"), Some(&1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bounded_cache_evicts_oldest() {
        let mut cache = AssetCache::new(Some(2));
        cache.insert_if_absent("a", 'a');
        cache.insert_if_absent("b", 'b');
        cache.insert_if_absent("c", 'c');
        assert!(!cache.contains("a"));
        assert!(cache.contains("b") && cache.contains("c"));
    }
}

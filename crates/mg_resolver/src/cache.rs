//! Fixed-capacity, thread-safe, recency-ordered cache.
//!
//! Lookup is a linear scan by key equality — hit rates are high and
//! capacities are tens of items, so the scan is a correctness baseline, not
//! a bottleneck. A hit is promoted to most-recently-used inside the same
//! critical section as the scan, so concurrent readers cannot lose
//! promotions; inserts at capacity evict the least-recently-used entry.

use std::collections::VecDeque;

use parking_lot::Mutex;

pub struct LruCache<K, V> {
    capacity: usize,
    items: Mutex<VecDeque<(K, V)>>,
}

impl<K: PartialEq + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Fetch by key, promoting a hit to the MRU position.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut items = self.items.lock();
        let pos = items.iter().position(|(k, _)| k == key)?;
        let entry = items.remove(pos)?;
        let value = entry.1.clone();
        items.push_front(entry);
        Some(value)
    }

    /// Insert at the MRU position, replacing any entry with the same key
    /// and evicting the LRU entry at capacity.
    pub fn put(&self, key: K, value: V) {
        let mut items = self.items.lock();
        if let Some(pos) = items.iter().position(|(k, _)| k == &key) {
            items.remove(pos);
        } else if items.len() >= self.capacity {
            items.pop_back();
        }
        items.push_front((key, value));
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_roundtrip() {
        let cache: LruCache<String, u32> = LruCache::new(4);
        cache.put("a".into(), 1);
        assert_eq!(cache.get(&"a".into()), Some(1));
        assert_eq!(cache.get(&"b".into()), None);
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache: LruCache<u32, u32> = LruCache::new(3);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);

        // Touch 1 so that 2 becomes the LRU entry
        assert!(cache.get(&1).is_some());
        cache.put(4, 40);

        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.get(&1), Some(10));
        assert_eq!(cache.get(&3), Some(30));
        assert_eq!(cache.get(&4), Some(40));
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache: LruCache<u32, u32> = LruCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(1, 11);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some(11));
        assert_eq!(cache.get(&2), Some(20));
    }

    #[test]
    fn concurrent_access_is_safe() {
        use std::sync::Arc;
        let cache: Arc<LruCache<u32, u32>> = Arc::new(LruCache::new(16));
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let cache = cache.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..200u32 {
                    cache.put(i % 32, t * 1000 + i);
                    let _ = cache.get(&(i % 32));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(cache.len() <= 16);
    }
}

//! Bounded LRU memo of resolved inputs, shared across connection tasks.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

use crate::resolver::DomainParts;

/// Mutex-guarded LRU keyed by the exact input string.
/// Concurrent misses on the same key may both compute; the last insert wins.
pub struct DomainCache {
    entries: Mutex<LruCache<String, DomainParts>>,
}

impl DomainCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<DomainParts> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, parts: DomainParts) {
        self.entries.lock().put(key, parts);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(host: &str) -> DomainParts {
        DomainParts {
            hostname: host.to_string(),
            zone: format!("{host}.zwb"),
            node: String::new(),
            name: format!("{host}.zwb"),
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = DomainCache::new(2);
        cache.insert("a".into(), parts("a"));
        cache.insert("b".into(), parts("b"));
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), parts("c"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(parts("a")));
        assert_eq!(cache.get("c"), Some(parts("c")));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let cache = DomainCache::new(0);
        assert!(cache.is_empty());
        cache.insert("a".into(), parts("a"));
        cache.insert("b".into(), parts("b"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(parts("b")));
    }

    #[test]
    fn concurrent_inserts_are_safe() {
        let cache = std::sync::Arc::new(DomainCache::new(512));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let key = format!("host{}", (t * 100 + i) % 300);
                        if cache.get(&key).is_none() {
                            cache.insert(key.clone(), parts(&key));
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 300);
    }
}

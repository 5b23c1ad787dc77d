use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::ApiResult;

/// Hit and miss counters for one state object cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Deduplicating cache for immutable state objects. Requesting the
/// same normalized description twice returns the same object.
pub struct StateObjectCache<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> StateObjectCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached object for `key`, creating it on first use.
    /// Creation failures are not cached.
    pub fn get_or_create<F>(&self, key: &K, create: F) -> ApiResult<Arc<V>>
    where
        F: FnOnce() -> ApiResult<V>,
    {
        let mut entries = self.entries.lock().unwrap();

        if let Some(existing) = entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(existing));
        }

        let value = Arc::new(create()?);
        entries.insert(key.clone(), Arc::clone(&value));
        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().unwrap().len(),
        }
    }
}

impl<K, V> Default for StateObjectCache<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_keys_share_one_object() {
        let cache: StateObjectCache<u32, String> = StateObjectCache::new();

        let a = cache.get_or_create(&7, || Ok("seven".to_string())).unwrap();
        let b = cache
            .get_or_create(&7, || panic!("must not recreate"))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = cache.get_or_create(&8, || Ok("eight".to_string())).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entries, 2);
    }

    #[test]
    fn failed_creation_is_not_cached() {
        let cache: StateObjectCache<u32, String> = StateObjectCache::new();

        let err = cache.get_or_create(&1, || {
            Err(crate::error::ApiError::invalid_arg("bad desc"))
        });
        assert!(err.is_err());
        assert_eq!(cache.stats().entries, 0);

        let ok = cache.get_or_create(&1, || Ok("fixed".to_string()));
        assert!(ok.is_ok());
    }
}

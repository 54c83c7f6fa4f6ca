//! Refinement cache.
//!
//! The `Refiner` only sees the `RefineCache` trait, so tests can inject a
//! fresh cache and a persistent store can be swapped in later.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

pub trait RefineCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
}

/// Cache key for one paper version: SHA-256 over `id` and `abstract`.
pub fn refine_key(id: &str, abstract_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b":");
    hasher.update(abstract_text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// In-process LRU cache shared by all requests.
pub struct LruRefineCache {
    inner: Mutex<LruCache<String, String>>,
}

impl LruRefineCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: Mutex::new(LruCache::new(capacity)) }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RefineCache for LruRefineCache {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(key.to_string(), value);
        }
    }
}

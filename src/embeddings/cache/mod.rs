#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Cache key: digest of (provider, model, dimensions, normalised text).
pub type CacheKey = [u8; 32];

/// Process-wide embedding cache with LRU eviction.
///
/// Constructed with an explicit capacity and handed to the embedding
/// service by `Arc`, never reached through a global. A capacity of
/// zero disables storage entirely. Lookups and inserts take the interior
/// lock only for the duration of the map operation; eviction is an O(len)
/// scan for the least recently used entry.
#[derive(Debug)]
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

#[derive(Debug)]
struct Entry {
    vector: Vec<f32>,
    last_used: u64,
}

impl EmbeddingCache {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Derive the cache key for one embedding request.
    ///
    /// Text is whitespace-normalised first so trivially reflowed inputs
    /// share an entry.
    #[inline]
    pub fn key(provider: &str, model: &str, dimensions: usize, text: &str) -> CacheKey {
        let normalized = normalize_text(text);
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0]);
        hasher.update(model.as_bytes());
        hasher.update([0]);
        hasher.update((dimensions as u64).to_le_bytes());
        hasher.update([0]);
        hasher.update(normalized.as_bytes());
        hasher.finalize().into()
    }

    #[inline]
    pub fn get(&self, key: &CacheKey) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.tick += 1;
        let tick = inner.tick;
        let found = inner.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.vector.clone()
        });
        match found {
            Some(vector) => {
                inner.hits += 1;
                Some(vector)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    #[inline]
    pub fn insert(&self, key: CacheKey, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| *k)
            {
                inner.entries.remove(&oldest);
                debug!("evicted least recently used embedding cache entry");
            }
        }

        inner.entries.insert(
            key,
            Entry {
                vector,
                last_used: tick,
            },
        );
    }

    /// Drop every entry; counters are kept.
    #[inline]
    pub fn clear(&self) {
        self.inner
            .lock()
            .expect("cache lock poisoned")
            .entries
            .clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since construction.
    #[inline]
    pub fn stats(&self) -> (u64, u64) {
        let inner = self.inner.lock().expect("cache lock poisoned");
        (inner.hits, inner.misses)
    }
}

fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.trim().chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

//! In-memory key/value cache with per-entry TTL.
//!
//! Eviction is lazy: an expired entry is removed the next time it is read.
//! `clean_expired` performs a full sweep and is meant to be driven by an
//! external scheduler; the cache never spawns its own timer.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_accessed: Instant,
}

/// Thread-safe TTL cache with optional bounded capacity.
///
/// When a maximum size is set, inserting past capacity evicts expired
/// entries first and then the least recently accessed live entries.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    default_ttl: Duration,
    max_size: Option<usize>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create an unbounded cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_size: None,
        }
    }

    /// Create a cache capped at `max_size` entries.
    pub fn with_capacity(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_size: Some(max_size),
        }
    }

    /// Store a value using the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_with_ttl(key, value, None);
    }

    /// Store a value, overriding the default TTL for this entry.
    pub fn set_with_ttl(&self, key: K, value: V, custom_ttl: Option<Duration>) {
        let now = Instant::now();
        let ttl = custom_ttl.unwrap_or(self.default_ttl);

        let entry = Entry {
            value,
            expires_at: now + ttl,
            last_accessed: now,
        };

        let mut entries = self.entries.write();
        entries.insert(key, entry);

        if let Some(max_size) = self.max_size {
            Self::evict_if_needed(&mut entries, max_size);
        }
    }

    /// Return the value if present and unexpired.
    ///
    /// An expired entry is removed as a side effect of the read.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.write();

        match entries.get_mut(key) {
            Some(entry) if now < entry.expires_at => {
                entry.last_accessed = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Whether `get` would currently return a value for this key.
    pub fn has(&self, key: &K) -> bool {
        let entries = self.entries.read();
        entries
            .get(key)
            .map(|entry| Instant::now() < entry.expires_at)
            .unwrap_or(false)
    }

    /// Remove an entry immediately. Returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.read().keys().cloned().collect()
    }

    /// Sweep all expired entries, returning how many were removed.
    ///
    /// Intended for periodic invocation by the caller's scheduler.
    pub fn clean_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    fn evict_if_needed(entries: &mut HashMap<K, Entry<V>>, max_size: usize) {
        if entries.len() <= max_size {
            return;
        }

        let now = Instant::now();
        entries.retain(|_, entry| now < entry.expires_at);

        while entries.len() > max_size {
            let lru_key = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_accessed)
                .map(|(k, _)| k.clone());

            if let Some(key) = lru_key {
                entries.remove(&key);
            } else {
                break;
            }
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

/// A resolved settings value as held in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Text(String),
    Flag(bool),
}

/// Process-wide settings cache.
///
/// Entries never expire; they live until [`flush_all`](Self::flush_all).
/// Every flush bumps a generation counter. A value resolved from the store
/// is only kept if no flush happened since its read began, so a read racing
/// a write can return the old value once but never pins it in the cache.
#[derive(Debug, Default)]
pub struct SettingsCache {
    entries: DashMap<String, CachedValue>,
    generation: AtomicU64,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` is a cache miss.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn set(&self, key: &str, value: CachedValue) {
        self.entries.insert(key.to_string(), value);
    }

    /// Current flush generation. Take it before reading the store.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cache `value` unless a flush happened after `generation` was taken.
    ///
    /// Returns whether the value was kept.
    pub fn set_if_current(&self, key: &str, value: CachedValue, generation: u64) -> bool {
        if self.generation() != generation {
            return false;
        }
        self.entries.insert(key.to_string(), value);
        // A flush may have slipped in between the check and the insert.
        if self.generation() != generation {
            self.entries.remove(key);
            return false;
        }
        true
    }

    pub fn flush_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let n = self.entries.len();
        self.entries.clear();
        debug!(entries = n, "settings cache flushed");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

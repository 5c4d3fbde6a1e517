//! TTL cache service for analysis results.
//!
//! An explicit cache object passed into the analysis agent rather than a
//! module-level map, with an injected clock so tests can control expiry
//! without sleeping. Entries are replaced atomically under the lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use tracing::debug;

/// Monotonic time source for TTL checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock-backed clock used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Process-wide TTL cache keyed by `K`.
pub struct TtlCache<K, V, C: Clock = SystemClock> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    ttl: Duration,
    clock: C,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V, SystemClock> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, SystemClock)
    }
}

impl<K: Eq + Hash, V: Clone, C: Clock> TtlCache<K, V, C> {
    pub fn with_clock(ttl: Duration, clock: C) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Fetch a live entry. An expired entry reads as a miss and is left
    /// for the next insert or clear to reclaim.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        if self.clock.now().duration_since(entry.inserted_at) >= self.ttl {
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: self.clock.now(),
            },
        );
    }

    /// Drop every entry. Called by the ingestion pipeline after new
    /// articles land.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let dropped = entries.len();
        entries.clear();
        if dropped > 0 {
            debug!(dropped, "Cache cleared");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

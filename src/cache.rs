//! Process-local key/value cache with per-entry expiry.
//!
//! Expiry is lazy: a stale entry is dropped the first time it is looked at.
//! There is no background sweeper and no size bound, which is fine for the
//! handful of named keys stored here. Each process holds its own cache, so a
//! write on one instance is only visible to others once their entries expire.
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

pub const DEFAULT_TTL_SECS: u64 = 300;

/// Time source for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: std::time::Duration) {
        let by = to_chrono(by);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or_else(|_| Duration::weeks(52 * 100))
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.created_at.checked_add_signed(self.ttl) {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    default_ttl: std::time::Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            default_ttl: std::time::Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }

    pub fn with_default_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> std::time::Duration {
        self.default_ttl
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: std::time::Duration) {
        let entry = CacheEntry {
            value,
            created_at: self.clock.now(),
            ttl: to_chrono(ttl),
        };
        self.entries.insert(key.into(), entry);
    }

    /// Store under the cache's default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let hit = {
            let entry = self.entries.get(key)?;
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        };
        if hit.is_none() {
            // Re-check under the write lock so a concurrent refresh survives.
            self.entries.remove_if(key, |_, e| e.is_expired(now));
        }
        hit
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

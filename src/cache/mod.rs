//! Request-level response cache.
//!
//! [`CacheManager`] is the single owner of cache state for an application:
//! the [`EntryStore`] over both storage classes, the clock used to stamp and
//! age entries, the process-wide [`CacheDefaults`], and the live key set:
//! every key written since the manager was created. Interceptors share the
//! manager through an [`Arc`](std::sync::Arc).
//!
//! Staleness is evaluated lazily on read; nothing runs in the background.
//! Orphaned durable entries are swept once, when the host calls
//! [`CacheManager::reconcile`] at teardown.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

mod clock;
mod entry;
mod key;
mod reconcile;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use key::{CACHE_PARAMS_MARKER, CacheKey, KeyError};
pub use reconcile::ReconcileReport;
pub use store::EntryStore;

use crate::config::{CacheDefaults, EffectiveCache};
use crate::storage::{StorageClass, Storages};

/// Result of looking a key up under its effective settings.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Nothing usable stored.
    Miss,
    /// Stored and younger than the TTL.
    Fresh(CacheEntry),
    /// Stored but too old; the entry has already been removed.
    Stale,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub writes: u64,
    pub purged: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    writes: AtomicU64,
    purged: AtomicU64,
}

/// Owner of all cache state for one application lifetime.
#[derive(Debug)]
pub struct CacheManager {
    store: EntryStore,
    defaults: CacheDefaults,
    clock: Arc<dyn Clock>,
    live_keys: Mutex<HashSet<CacheKey>>,
    reconciled: AtomicBool,
    counters: Counters,
}

impl CacheManager {
    /// Creates a manager with an empty live-key set.
    ///
    /// # Arguments
    ///
    /// * `storages` - The session and durable stores entries are written to.
    /// * `defaults` - Process-wide settings merged with each request's options.
    /// * `clock` - Source of `writtenAt` stamps and entry ages.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use recache::cache::{CacheManager, ManualClock};
    /// use recache::config::CacheDefaults;
    /// use recache::storage::Storages;
    ///
    /// let manager = CacheManager::new(
    ///     Storages::in_memory(),
    ///     CacheDefaults::new().cache(true),
    ///     Arc::new(ManualClock::new(42)),
    /// );
    /// assert_eq!(manager.now_ms(), 42);
    /// assert_eq!(manager.live_key_count(), 0);
    /// ```
    pub fn new(storages: Storages, defaults: CacheDefaults, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: EntryStore::new(storages),
            defaults,
            clock,
            live_keys: Mutex::new(HashSet::new()),
            reconciled: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// In-memory storages, default settings, system clock.
    pub fn in_memory() -> Self {
        Self::new(
            Storages::in_memory(),
            CacheDefaults::default(),
            Arc::new(SystemClock),
        )
    }

    /// Process-wide settings used when a request does not override them.
    pub fn defaults(&self) -> &CacheDefaults {
        &self.defaults
    }

    /// Typed access to the underlying stores.
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Current time in milliseconds, as stamped on new entries.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Looks `key` up in the storage class `effective` selects.
    ///
    /// A stale entry is deleted before returning [`Lookup::Stale`].
    pub fn lookup(&self, key: &CacheKey, effective: &EffectiveCache) -> Lookup {
        let Some(entry) = self.store.read(effective.storage, key) else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(%key, storage = %effective.storage, "cache miss");
            return Lookup::Miss;
        };

        let now = self.now_ms();
        let age_ms = entry.age_ms(now);
        if entry.is_fresh(now, effective.ttl) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            debug!(%key, age_ms, "cache hit");
            return Lookup::Fresh(entry);
        }

        self.counters.stale.fetch_add(1, Ordering::Relaxed);
        let ttl_ms = u64::try_from(effective.ttl.as_millis()).unwrap_or(u64::MAX);
        debug!(%key, age_ms, ttl_ms, "stale cache entry, evicting");
        if let Err(e) = self.store.remove(effective.storage, key) {
            warn!(%key, error = %e, "failed to evict stale cache entry");
        }
        Lookup::Stale
    }

    /// Writes `entry` under `key` and marks the key live for this session.
    ///
    /// The key is recorded even if the write fails, so a durable entry that
    /// did land is never swept as an orphan.
    pub fn record(&self, key: CacheKey, class: StorageClass, entry: &CacheEntry) {
        if let Err(e) = self.store.write(class, &key, entry) {
            warn!(%key, storage = %class, error = %e, "failed to write cache entry");
        } else {
            self.counters.writes.fetch_add(1, Ordering::Relaxed);
            debug!(%key, storage = %class, "cache entry written");
        }
        self.live_keys().insert(key);
    }

    /// Drops every entry for `url` in both storage classes.
    pub fn invalidate_url(&self, url: &str) -> usize {
        let removed = self.store.purge_url(url);
        self.counters
            .purged
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Returns `true` if `key` has been written since the manager was created.
    pub fn is_live(&self, key: &str) -> bool {
        self.live_keys().contains(key)
    }

    /// Number of keys written since the manager was created.
    pub fn live_key_count(&self) -> usize {
        self.live_keys().len()
    }

    /// Snapshot of the hit, miss, stale, write and purge counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
        }
    }

    fn live_keys(&self) -> MutexGuard<'_, HashSet<CacheKey>> {
        self.live_keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! End-of-session sweep of durable storage.

use std::sync::atomic::Ordering;

use tracing::{debug, info, warn};

use super::{CacheKey, CacheManager};
use crate::storage::StorageClass;

/// Outcome of a teardown sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Durable keys examined.
    pub scanned: usize,
    /// Orphaned cache keys deleted.
    pub removed: usize,
    /// Orphans whose deletion failed.
    pub failed: usize,
}

impl CacheManager {
    /// Deletes durable cache entries that were not written this session.
    ///
    /// Only keys carrying the cache marker are touched; anything else the
    /// durable store holds belongs to someone else. Session storage is left
    /// alone. Runs at most once per manager; later calls return an empty
    /// report.
    pub fn reconcile(&self) -> ReconcileReport {
        if self.reconciled.swap(true, Ordering::SeqCst) {
            debug!("cache already reconciled, skipping");
            return ReconcileReport::default();
        }

        let durable = self.store().storages().get(StorageClass::Durable);
        // Snapshot first: removing while walking by index would skip keys.
        let keys = durable.keys();
        let live = self.live_keys();

        let mut report = ReconcileReport {
            scanned: keys.len(),
            ..ReconcileReport::default()
        };
        for key in keys
            .iter()
            .filter(|k| CacheKey::is_cache_key(k) && !live.contains(k.as_str()))
        {
            match durable.remove(key) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(%key, error = %e, "failed to remove orphaned cache entry");
                }
            }
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            failed = report.failed,
            live = live.len(),
            "durable cache reconciled"
        );
        report
    }
}

//! Typed access to cache entries over the raw key/value stores.

use tracing::{debug, warn};

use super::{CacheEntry, CacheKey};
use crate::storage::{StorageClass, StorageError, Storages};

/// Reads and writes [`CacheEntry`] envelopes.
///
/// A stored value that does not decode as an entry is reported as absent;
/// it is left in place and will be overwritten by the next successful write.
#[derive(Debug, Clone)]
pub struct EntryStore {
    storages: Storages,
}

impl EntryStore {
    /// Wraps `storages`.
    pub fn new(storages: Storages) -> Self {
        Self { storages }
    }

    /// The raw stores, one per [`StorageClass`].
    pub fn storages(&self) -> &Storages {
        &self.storages
    }

    /// Reads and decodes the entry under `key` in `class`.
    ///
    /// # Returns
    ///
    /// `None` when the key is absent or its value is not a valid entry.
    pub fn read(&self, class: StorageClass, key: &CacheKey) -> Option<CacheEntry> {
        let raw = self.storages.get(class).get(key.as_str())?;
        match CacheEntry::decode(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(%key, storage = %class, error = %e, "malformed cache entry, treating as miss");
                None
            }
        }
    }

    /// Encodes `entry` and stores it under `key` in `class`, replacing any
    /// previous value.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Serialize`]: the entry could not be encoded.
    /// - Any error the backing store returns from `set`.
    pub fn write(
        &self,
        class: StorageClass,
        key: &CacheKey,
        entry: &CacheEntry,
    ) -> Result<(), StorageError> {
        let raw = entry.encode().map_err(StorageError::Serialize)?;
        self.storages.get(class).set(key.as_str(), raw)
    }

    /// Deletes `key` from `class`. Deleting an absent key succeeds.
    pub fn remove(&self, class: StorageClass, key: &CacheKey) -> Result<(), StorageError> {
        self.storages.get(class).remove(key.as_str())
    }

    /// Removes every entry belonging to `url` from both storage classes.
    ///
    /// Matches the bare URL and any key derived from it, whatever its body or
    /// params. Returns how many keys were removed; failures are logged and
    /// skipped.
    pub fn purge_url(&self, url: &str) -> usize {
        let prefix = CacheKey::url_prefix(url);
        let mut removed = 0;
        for class in StorageClass::ALL {
            let storage = self.storages.get(class);
            let doomed: Vec<String> = storage
                .keys()
                .into_iter()
                .filter(|k| k == url || k.starts_with(&prefix))
                .collect();
            for key in doomed {
                match storage.remove(&key) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(%key, storage = %class, error = %e, "failed to purge cache entry"),
                }
            }
        }
        if removed > 0 {
            debug!(url, removed, "purged cache entries for uncached request");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn key(raw: &str) -> CacheKey {
        CacheKey::derive(raw, None, None).unwrap()
    }

    #[test]
    fn write_then_read() {
        let store = EntryStore::new(Storages::in_memory());
        let entry = CacheEntry::new(10, Value::Null, Value::Null, json!({"a": 1}));
        store.write(StorageClass::Durable, &key("/a"), &entry).unwrap();
        assert_eq!(store.read(StorageClass::Durable, &key("/a")), Some(entry));
        assert_eq!(store.read(StorageClass::Session, &key("/a")), None);
    }

    #[test]
    fn malformed_blob_is_a_miss() {
        let storages = Storages::in_memory();
        storages
            .get(StorageClass::Session)
            .set("/a?cacheParams=", "{not json".to_owned())
            .unwrap();
        let store = EntryStore::new(storages);
        assert_eq!(store.read(StorageClass::Session, &key("/a")), None);
    }

    #[test]
    fn purge_url_clears_both_classes() {
        let storages = Storages::in_memory();
        storages.get(StorageClass::Session).set("/a?cacheParams=x", "{}".into()).unwrap();
        storages.get(StorageClass::Durable).set("/a?cacheParams=y", "{}".into()).unwrap();
        storages.get(StorageClass::Durable).set("/a", "{}".into()).unwrap();
        storages.get(StorageClass::Durable).set("/ab?cacheParams=", "{}".into()).unwrap();
        let store = EntryStore::new(storages.clone());

        assert_eq!(store.purge_url("/a"), 3);
        assert!(storages.get(StorageClass::Session).is_empty());
        assert_eq!(
            storages.get(StorageClass::Durable).keys(),
            vec!["/ab?cacheParams=".to_owned()]
        );
    }

    #[test]
    fn purge_url_scales_to_large_stores() {
        let storages = Storages::in_memory();
        let session = storages.get(StorageClass::Session);
        for i in 0..20_000 {
            session.set(&format!("/item/{i}?cacheParams="), "{}".into()).unwrap();
        }
        session.set("/target?cacheParams=a=1", "{}".into()).unwrap();
        session.set("/target?cacheParams=a=2", "{}".into()).unwrap();
        let store = EntryStore::new(storages.clone());

        let started = std::time::Instant::now();
        assert_eq!(store.purge_url("/target"), 2);
        assert_eq!(session.len(), 20_000);
        // A single-pass listing finishes far inside this even in debug builds.
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}

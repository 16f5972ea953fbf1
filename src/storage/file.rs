use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{Storage, StorageError};

/// Durable store persisted as a single JSON object file.
///
/// The file is read once at [`open`](Self::open); afterwards every write is
/// applied in memory and then flushed to disk through a temp file and a
/// rename, so a crash mid-write leaves the previous contents intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Io`]: the file exists but cannot be read.
    /// - [`StorageError::Format`]: the file is not a JSON object of strings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let map: BTreeMap<String, String> = match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|source| StorageError::Format {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = map.len(), "durable store opened");
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn map(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Sibling of the store file with `.tmp` appended to the full file name,
    // so it never collides with the store itself.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn persist(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        let raw = serde_json::to_vec(map).map_err(|source| StorageError::Format {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.temp_path();
        fs::write(&tmp, raw).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut map = self.map();
        map.insert(key.to_owned(), value);
        self.persist(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map();
        if map.remove(key).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.map().len()
    }

    fn key_at(&self, index: usize) -> Option<String> {
        self.map().keys().nth(index).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.map().keys().cloned().collect()
    }
}

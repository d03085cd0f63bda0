//! Durable string-keyed storage.
//!
//! SYSTEM CONTEXT
//! ==============
//! Plays the role a browser's `localStorage` plays for a web client: a
//! synchronous `key -> string` map, shared by every component, that
//! survives restarts. Local stores and the auth session both live here.
//!
//! DESIGN
//! ======
//! `FileStorage` keeps the whole map in memory and rewrites one JSON file
//! on every mutation (temp file + rename, so a crash leaves either the old
//! or the new map). `MemoryStorage` is the same contract without a file.
//!
//! ERROR HANDLING
//! ==============
//! A failed write leaves the in-memory map unchanged, so `get` never
//! reports a value the file does not hold.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Default quota, matching the common browser `localStorage` budget.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

// =============================================================================
// ERROR
// =============================================================================

/// Failures reading or writing a durable slot.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The slot holds text that does not decode into the expected type.
    #[error("stored value under `{key}` could not be decoded: {source}")]
    Deserialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be encoded for storage.
    #[error("value for `{key}` could not be encoded: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backing store could not be read or written.
    #[error("storage unavailable for `{key}`: {source}")]
    StorageUnavailable {
        key: String,
        #[source]
        source: io::Error,
    },

    /// The write would take the store past its byte quota.
    #[error("storage quota of {limit} bytes exceeded writing `{key}`")]
    QuotaExceeded { key: String, limit: usize },
}

// =============================================================================
// CONTRACT
// =============================================================================

/// Synchronous, persistent `key -> string` store.
pub trait KeyValueStore: Send + Sync {
    /// Stored string for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any prior content.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` or `QuotaExceeded`.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// MEMORY
// =============================================================================

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// Store backed by a single JSON map file inside a data directory.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    quota_bytes: Option<usize>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// File name of the map inside the data directory.
    pub const FILE_NAME: &'static str = "local_storage.json";

    /// Open (or create) the store in `dir`.
    ///
    /// `quota_bytes` bounds the summed byte length of all keys and values.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the directory cannot be created or the
    /// existing file cannot be read or parsed.
    pub fn open(dir: impl AsRef<Path>, quota_bytes: Option<usize>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let path = dir.join(Self::FILE_NAME);
        fs::create_dir_all(dir).map_err(|source| unavailable(&path, source))?;

        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| unavailable(&path, io::Error::new(io::ErrorKind::InvalidData, e)))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(unavailable(&path, source)),
        };

        debug!(path = %path.display(), keys = entries.len(), "opened file storage");
        Ok(Self { path, quota_bytes, entries: Mutex::new(entries) })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Summed byte length of all keys and values currently stored.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        usage(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> io::Result<()> {
        let raw = serde_json::to_vec_pretty(entries).map_err(io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &raw)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = raw.len(), "flushed file storage");
        Ok(())
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock();
        let previous = entries.insert(key.to_owned(), value.to_owned());

        if let Some(limit) = self.quota_bytes {
            if usage(&entries) > limit {
                restore(&mut entries, key, previous);
                return Err(StoreError::QuotaExceeded { key: key.to_owned(), limit });
            }
        }

        if let Err(source) = self.flush(&entries) {
            restore(&mut entries, key, previous);
            return Err(StoreError::StorageUnavailable { key: key.to_owned(), source });
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.lock();
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(source) = self.flush(&entries) {
            entries.insert(key.to_owned(), previous);
            return Err(StoreError::StorageUnavailable { key: key.to_owned(), source });
        }
        Ok(())
    }
}

fn usage(entries: &BTreeMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

fn restore(entries: &mut BTreeMap<String, String>, key: &str, previous: Option<String>) {
    match previous {
        Some(value) => {
            entries.insert(key.to_owned(), value);
        }
        None => {
            entries.remove(key);
        }
    }
}

fn unavailable(path: &Path, source: io::Error) -> StoreError {
    StoreError::StorageUnavailable { key: path.display().to_string(), source }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;

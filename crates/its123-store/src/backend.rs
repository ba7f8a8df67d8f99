//! Storage backends
//!
//! A backend is a flat string map. [`MemoryBackend`] lives for the process,
//! [`FileBackend`] writes through to a JSON file so a restarted client can
//! resume an unfinished run.

use crate::error::StoreError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Raw key/value storage
pub trait StorageBackend: Send + Sync + Debug {
    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Read the value stored under `key`
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot of all stored keys
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-process backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the backend holds no keys
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.iter().map(|e| e.key().clone()).collect())
    }
}

/// JSON file backend
///
/// The whole map is rewritten on every mutation through a sibling temp file
/// and a rename, so a crash leaves either the old or the new content.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileBackend {
    /// Open (or lazily create) the store file at `path`
    ///
    /// # Errors
    /// - `StoreError::Io` if an existing file cannot be read
    /// - `StoreError::Serialization` if it is not a JSON string map
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| StoreError::io_error(&path, e))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io_error(parent, e))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_string(entries)?;
        fs::write(&tmp, json).map_err(|e| StoreError::io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io_error(&self.path, e))
    }
}

impl StorageBackend for FileBackend {
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

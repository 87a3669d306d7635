//! Durable key/value cache holding serialized snapshots
//!
//! The engine only ever touches two slots (snapshot and version tag), but
//! backends are plain string maps so they stay trivially swappable.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;

use crate::error::CacheError;

/// Trait for durable cache backends
#[async_trait]
pub trait SnapshotCache: Send + Sync + Debug {
    /// Read a slot; `None` if it was never written or has been removed
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Replace a slot's contents
    ///
    /// Readers must observe either the old or the new contents, never a mix.
    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Remove a slot; removing an absent slot is not an error
    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// In-process cache backend
///
/// Counts writes per key, which makes it the backend of choice for
/// checking how many commits actually happened.
#[derive(Debug, Default)]
pub struct MemoryCache {
    slots: Mutex<HashMap<String, String>>,
    writes: Mutex<HashMap<String, usize>>,
}

impl MemoryCache {
    /// Create an empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with slots (not counted as writes)
    #[must_use]
    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let slots = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            slots: Mutex::new(slots),
            writes: Mutex::new(HashMap::new()),
        }
    }

    /// Synchronous peek at a slot
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.slots.lock().get(key).cloned()
    }

    /// Number of successful writes to `key` so far
    #[must_use]
    pub fn write_count(&self, key: &str) -> usize {
        self.writes.lock().get(key).copied().unwrap_or(0)
    }

    /// Number of occupied slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True if no slot is occupied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.get(key))
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.slots.lock().insert(key.to_string(), value.to_string());
        *self.writes.lock().entry(key.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.slots.lock().remove(key);
        Ok(())
    }
}

/// File-per-slot cache backend rooted at a directory
///
/// Writes go to a hidden temp file first and are moved into place with a
/// rename, so a crash mid-write leaves the previous contents intact.
#[derive(Debug, Clone)]
pub struct FileCache {
    base_dir: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) a cache directory
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    pub async fn open(base_dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio_fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| CacheError::io_error(base_dir.display().to_string(), e))?;
        Ok(Self { base_dir })
    }

    /// Directory holding the slots
    #[inline]
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(key.replace(':', "_")))
    }
}

#[async_trait]
impl SnapshotCache for FileCache {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.slot_path(key)?;
        match tokio_fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io_error(key, e)),
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.slot_path(key)?;
        let tmp = self.base_dir.join(format!(".{}.tmp", key.replace(':', "_")));
        tokio_fs::write(&tmp, value.as_bytes())
            .await
            .map_err(|e| CacheError::io_error(key, e))?;
        tokio_fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::io_error(key, e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.slot_path(key)?;
        match tokio_fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io_error(key, e)),
        }
    }
}

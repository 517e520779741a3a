use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::fingerprint::digest_hex;
use super::types::StoreError;
use crate::constants::CACHE_FILE_EXTENSION;

/// Flat key-value medium underneath a persistent cache store
///
/// Keys are already namespaced by the caller. Durability is best-effort:
/// losing values is tolerated, and callers treat every error as "absent".
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Process-lifetime backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Directory-backed store, one file per key
#[derive(Debug)]
pub struct FileBackend {
    cache_dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a cache directory
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|e| {
            StoreError::Unavailable(format!("{}: {}", cache_dir.display(), e))
        })?;
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// File path for a key
    fn entry_path(&self, key: &str) -> PathBuf {
        let hash = digest_hex(key.as_bytes());
        // First 2 chars of the hash shard the directory
        self.cache_dir
            .join(&hash[..2])
            .join(format!("{}.{}", hash, CACHE_FILE_EXTENSION))
    }
}

impl KeyValueStore for FileBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let parent = path.parent().unwrap_or(&self.cache_dir);
        fs::create_dir_all(parent)?;

        // Each write stages into its own file, so concurrent writers never
        // interleave and readers see either the old entry or a whole new one
        let mut staged = NamedTempFile::new_in(parent)?;
        staged.write_all(value)?;
        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

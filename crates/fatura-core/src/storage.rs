//! Blob storage for uploaded statement files
//!
//! The importer only needs `store(bytes) -> key` and `read(key) -> bytes`;
//! where the bytes live is up to the implementation.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Opaque blob storage keyed by a path string
pub trait Storage: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Store bytes and return the key to read them back
    fn store(&self, bytes: &[u8]) -> Result<String>;

    /// Read previously stored bytes
    fn read(&self, key: &str) -> Result<Vec<u8>>;
}

/// Content address of a blob: lowercase SHA-256 hex
pub fn content_key(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn check_key(key: &str) -> Result<()> {
    if key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::Storage(format!("invalid storage key: {}", key)))
    }
}

/// Content-addressed files under a directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create storage directory {}: {}",
                    root.display(),
                    e
                ))
            })?;
            info!("Created storage directory: {}", root.display());
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(&key[..2]).join(key)
    }
}

impl Storage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    fn store(&self, bytes: &[u8]) -> Result<String> {
        let key = content_key(bytes);
        let path = self.blob_path(&key);

        if path.exists() {
            debug!(key = %key, "Blob already stored");
            return Ok(key);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        info!("Stored blob: {}", path.display());
        Ok(key)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        check_key(key)?;
        let path = self.blob_path(key);

        if !path.exists() {
            return Err(Error::Storage(format!("Blob not found: {}", key)));
        }

        Ok(fs::read(path)?)
    }
}

/// In-process store for embedding and tests
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget a blob, so later reads fail
    pub fn remove(&self, key: &str) -> Result<bool> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))?;
        Ok(blobs.remove(key).is_some())
    }
}

impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    fn store(&self, bytes: &[u8]) -> Result<String> {
        let key = content_key(bytes);
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))?;
        blobs.entry(key.clone()).or_insert_with(|| bytes.to_vec());
        Ok(key)
    }

    fn read(&self, key: &str) -> Result<Vec<u8>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| Error::Storage("memory storage lock poisoned".into()))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("Blob not found: {}", key)))
    }
}

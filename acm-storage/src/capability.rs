//! The `StorageProvider` capability boundary (spec.md §6.1).
//!
//! The core consumes this capability; it never implements a concrete
//! backend (GitHub/local file I/O is explicitly out of scope, spec.md §1).
//! An in-memory test double lives here too, since every other crate's test
//! suite needs one.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Bytes plus the metadata the core needs without re-reading the path.
#[derive(Debug, Clone)]
pub struct ReadResult {
    pub bytes: Vec<u8>,
    /// `"git:<sha>"` or `"sha256:<hex>"` (spec.md §6.1).
    pub hash: String,
    pub size: u64,
}

/// Capability flags a backend advertises (spec.md §6.1). The core never
/// depends on atomicity; it reconciles via the artifact index on restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageCapabilities {
    pub atomic_batch: bool,
    pub versioned_history: bool,
    pub native_hash: bool,
    pub rate_limited: bool,
}

/// One entry in a `batch_write` call.
pub struct BatchWriteEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn read(&self, path: &str) -> Result<ReadResult, StorageError>;
    async fn write(&self, path: &str, bytes: &[u8], message: &str) -> Result<String, StorageError>;
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
    async fn hash(&self, path: &str) -> Result<String, StorageError>;
    /// May be atomic or best-effort depending on `capabilities().atomic_batch`.
    async fn batch_write(
        &self,
        entries: Vec<BatchWriteEntry>,
        message: &str,
    ) -> Result<String, StorageError>;

    fn capabilities(&self) -> StorageCapabilities;
}

/// In-memory `StorageProvider` used by test suites across the workspace.
#[derive(Default)]
pub struct InMemoryStorage {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.write().await.insert(path.into(), content.into());
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorage {
    async fn read(&self, path: &str) -> Result<ReadResult, StorageError> {
        let files = self.files.read().await;
        let bytes = files
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        let hash = crate::hashing::content_hash(&String::from_utf8_lossy(&bytes));
        let size = bytes.len() as u64;
        Ok(ReadResult { bytes, hash, size })
    }

    async fn write(&self, path: &str, bytes: &[u8], _message: &str) -> Result<String, StorageError> {
        self.files
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(format!("mem:{path}"))
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn hash(&self, path: &str) -> Result<String, StorageError> {
        Ok(self.read(path).await?.hash)
    }

    async fn batch_write(
        &self,
        entries: Vec<BatchWriteEntry>,
        message: &str,
    ) -> Result<String, StorageError> {
        for entry in entries {
            self.write(&entry.path, &entry.bytes, message).await?;
        }
        Ok(format!("mem-batch:{message}"))
    }

    fn capabilities(&self) -> StorageCapabilities {
        StorageCapabilities {
            atomic_batch: false,
            versioned_history: false,
            native_hash: true,
            rate_limited: false,
        }
    }
}

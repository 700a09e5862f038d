//! Stored-file access for edit sources.
//!
//! An edit job may reference its source image by an opaque key instead of
//! a URL; the file store resolves such keys to raw bytes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FileStoreError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("invalid file key: {0}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(String),
}

/// Read-only lookup of stored files by opaque key.
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Vec<u8>, FileStoreError>;
}

/// Files under a root directory, keyed by file name.
#[derive(Debug)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, FileStoreError> {
        // Keys are opaque names, never paths.
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
            return Err(FileStoreError::InvalidKey(key.to_string()));
        }

        let path = self.root.join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(FileStoreError::Io(err.to_string())),
        }
    }
}

/// In-memory file store for tests.
#[derive(Debug, Default)]
pub struct InMemoryFileStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(key.into(), bytes);
    }
}

#[async_trait::async_trait]
impl FileStore for InMemoryFileStore {
    async fn load(&self, key: &str) -> Result<Vec<u8>, FileStoreError> {
        self.files
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(key.to_string()))
    }
}

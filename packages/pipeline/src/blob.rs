//! Saksflyt Pipeline: Document Blob Access
//!
//! Bytes are written once at upload and never mutated; the extractor reads
//! them without locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use saksflyt_core::{Error, Result};

/// Write-once blob storage keyed by the document's opaque handle.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

/// Filesystem-backed blobs under a configured root.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Keys are generated internally, but reject traversal anyway.
        if key.split('/').any(|part| part == ".." || part.is_empty()) || Path::new(key).is_absolute()
        {
            return Err(Error::Storage(format!("invalid storage key {key:?}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("create {parent:?}: {e}")))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Storage(format!("write {path:?}: {e}")))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Storage(format!("read {path:?}: {e}")))
    }
}

/// In-memory blobs for tests and demos.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("blob {key:?} missing")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let blobs = MemoryBlobStore::new();
        blobs.put("documents/a/b", b"bytes").await.unwrap();
        assert_eq!(blobs.get("documents/a/b").await.unwrap(), b"bytes");
        assert!(blobs.get("documents/a/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_fs_round_trip() {
        let dir = std::env::temp_dir().join(format!("saksflyt-blob-{}", uuid::Uuid::new_v4()));
        let blobs = FsBlobStore::new(&dir);
        blobs.put("documents/case/doc", b"content").await.unwrap();
        assert_eq!(blobs.get("documents/case/doc").await.unwrap(), b"content");
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let blobs = FsBlobStore::new("/tmp/root");
        assert!(blobs.get("../etc/passwd").await.is_err());
        assert!(blobs.get("/abs/path").await.is_err());
        assert!(blobs.get("a//b").await.is_err());
    }
}

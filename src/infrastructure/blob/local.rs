//! Blob store backed by a local directory, one file per key.

use crate::core::errors::TripsplitError;
use crate::infrastructure::blob::BlobStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalBlobStore { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, TripsplitError> {
        if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
            return Err(TripsplitError::StorageError(format!("Invalid blob key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), TripsplitError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| TripsplitError::StorageError(format!("Failed to create blob directory: {}", e)))?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| TripsplitError::StorageError(format!("Failed to write blob {}: {}", key, e)))?;
        debug!(key, content_type, "Stored blob");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TripsplitError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TripsplitError::StorageError(format!("Failed to read blob {}: {}", key, e))),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), TripsplitError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TripsplitError::StorageError(format!("Failed to delete blob {}: {}", key, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_reads_and_deletes_files() {
        let root = std::env::temp_dir().join(format!("tripsplit-blobs-{}", uuid::Uuid::new_v4()));
        let store = LocalBlobStore::new(&root);

        store.put("a_receipt.txt", b"hello".to_vec(), "text/plain").await.unwrap();
        assert_eq!(store.get("a_receipt.txt").await.unwrap(), Some(b"hello".to_vec()));

        store.delete("a_receipt.txt").await.unwrap();
        assert_eq!(store.get("a_receipt.txt").await.unwrap(), None);
        store.delete("a_receipt.txt").await.unwrap();

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_root() {
        let store = LocalBlobStore::new(std::env::temp_dir());
        let err = store.get("../secret").await.unwrap_err();
        assert!(matches!(err, TripsplitError::StorageError(_)));
    }
}

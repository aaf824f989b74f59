use std::path::PathBuf;

use crate::config::StorageConfig;
use crate::error::{AppError, AppResult};

/// On-disk blob store. Blobs are opaque byte strings addressed by key; all
/// metadata (filename, content type) lives in the `attachments` table.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.root.clone(),
        }
    }

    pub async fn init(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Internal(format!("storage init failed: {e}")))?;
        Ok(())
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> AppResult<()> {
        tokio::fs::write(self.path_for(key), bytes)
            .await
            .map_err(|e| AppError::Internal(format!("blob write failed: {e}")))?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        tokio::fs::read(self.path_for(key))
            .await
            .map_err(|e| AppError::Internal(format!("blob read failed: {e}")))
    }

    /// Missing blobs are treated as already deleted.
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Internal(format!("blob delete failed: {e}"))),
        }
    }
}

#[cfg(test)]
impl Storage {
    fn with_root(root: &std::path::Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path());

        storage.put("key-1", b"rulebook bytes").await.unwrap();
        assert_eq!(storage.get("key-1").await.unwrap(), b"rulebook bytes");

        storage.delete("key-1").await.unwrap();
        assert!(storage.get("key-1").await.is_err());
    }

    #[tokio::test]
    async fn deleting_a_missing_blob_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path());
        storage.delete("never-existed").await.unwrap();
    }
}

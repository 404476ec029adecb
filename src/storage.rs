use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Prefix under the data dir where thread uploads land. The stored reference
/// kept on a thread includes it; `Thread::file_name` strips it for display.
const UPLOAD_PREFIX: &str = "thread_files";

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persist an upload, returning the stored reference to keep on the
    /// thread record.
    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, FileStoreError>;
    /// Full contents plus a sniffed content type.
    async fn load(&self, stored: &str) -> Result<(Vec<u8>, String), FileStoreError>;
    /// Up to `len` leading bytes, for signature probing.
    async fn probe(&self, stored: &str, len: usize) -> Result<Vec<u8>, FileStoreError>;
}

pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    pub fn new() -> Self {
        let root = std::env::var("RBB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        Self { root }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, stored: &str) -> Result<PathBuf, FileStoreError> {
        // stored references are generated by `save`; anything path-like that
        // escapes the root is rejected outright
        if stored.contains("..") || stored.starts_with('/') {
            return Err(FileStoreError::NotFound);
        }
        Ok(self.root.join(stored))
    }
}

impl Default for FsFileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStore for FsFileStore {
    async fn save(&self, original_name: &str, bytes: &[u8]) -> Result<String, FileStoreError> {
        let base = original_name
            .rsplit(['/', '\\'])
            .next()
            .filter(|b| !b.is_empty())
            .unwrap_or("upload");
        let stored = format!("{UPLOAD_PREFIX}/{}_{base}", Uuid::new_v4());
        let path = self.path_for(&stored)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FileStoreError::Other(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| FileStoreError::Other(e.to_string()))?;
        Ok(stored)
    }

    async fn load(&self, stored: &str) -> Result<(Vec<u8>, String), FileStoreError> {
        let path = self.path_for(stored)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| FileStoreError::NotFound)?;
        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        Ok((bytes, mime))
    }

    async fn probe(&self, stored: &str, len: usize) -> Result<Vec<u8>, FileStoreError> {
        let (mut bytes, _) = self.load(stored).await?;
        bytes.truncate(len);
        Ok(bytes)
    }
}

/// Factory used in `main`.
pub fn build_file_store() -> Arc<dyn FileStore> {
    let store = FsFileStore::new();
    info!("file store root: {}", store.root.display());
    Arc::new(store)
}

use std::io;

use bytes::Bytes;

use crate::domain::ContentPath;

/// The content directory holding uploaded audio and transcript files.
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Writes `data` only if nothing exists at `path` yet.
    /// Returns [`ContentStoreError::AlreadyExists`] otherwise.
    async fn create_new(&self, path: &ContentPath, data: Bytes) -> Result<u64, ContentStoreError>;

    /// Replaces `path` atomically: readers see the old file or the complete new one.
    async fn write_atomic(&self, path: &ContentPath, data: Bytes) -> Result<u64, ContentStoreError>;

    async fn fetch(&self, path: &ContentPath) -> Result<Vec<u8>, ContentStoreError>;

    async fn delete(&self, path: &ContentPath) -> Result<(), ContentStoreError>;

    async fn exists(&self, path: &ContentPath) -> Result<bool, ContentStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ContentStoreError {
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::application::ports::{ContentStore, ContentStoreError};
use crate::domain::ContentPath;

/// Content directory on the local filesystem.
///
/// `LocalFileSystem` stages every put in a sibling file and then renames
/// (overwrite) or hard-links (create) it into place, so readers never see a
/// partially written object.
pub struct LocalContentStore {
    inner: Arc<LocalFileSystem>,
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(base_path: PathBuf) -> Result<Self, ContentStoreError> {
        std::fs::create_dir_all(&base_path).map_err(ContentStoreError::Io)?;
        let root = std::fs::canonicalize(&base_path).map_err(ContentStoreError::Io)?;
        let fs = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| ContentStoreError::WriteFailed(e.to_string()))?;
        Ok(Self {
            inner: Arc::new(fs),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl ContentStore for LocalContentStore {
    async fn create_new(&self, path: &ContentPath, data: Bytes) -> Result<u64, ContentStoreError> {
        let store_path = StorePath::from(path.as_str());
        let size = data.len() as u64;

        match self
            .inner
            .put_opts(
                &store_path,
                PutPayload::from(data),
                PutOptions::from(PutMode::Create),
            )
            .await
        {
            Ok(_) => Ok(size),
            Err(object_store::Error::AlreadyExists { .. }) => {
                Err(ContentStoreError::AlreadyExists(path.to_string()))
            }
            Err(e) => Err(ContentStoreError::WriteFailed(e.to_string())),
        }
    }

    async fn write_atomic(&self, path: &ContentPath, data: Bytes) -> Result<u64, ContentStoreError> {
        let store_path = StorePath::from(path.as_str());
        let size = data.len() as u64;
        self.inner
            .put(&store_path, PutPayload::from(data))
            .await
            .map_err(|e| ContentStoreError::WriteFailed(e.to_string()))?;
        Ok(size)
    }

    async fn fetch(&self, path: &ContentPath) -> Result<Vec<u8>, ContentStoreError> {
        let store_path = StorePath::from(path.as_str());
        let result = self.inner.get(&store_path).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ContentStoreError::NotFound(path.to_string()),
            other => ContentStoreError::ReadFailed(other.to_string()),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| ContentStoreError::ReadFailed(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn delete(&self, path: &ContentPath) -> Result<(), ContentStoreError> {
        let store_path = StorePath::from(path.as_str());
        self.inner
            .delete(&store_path)
            .await
            .map_err(|e| ContentStoreError::DeleteFailed(e.to_string()))
    }

    async fn exists(&self, path: &ContentPath) -> Result<bool, ContentStoreError> {
        let store_path = StorePath::from(path.as_str());
        match self.inner.head(&store_path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ContentStoreError::ReadFailed(e.to_string())),
        }
    }
}

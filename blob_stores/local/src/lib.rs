use anyhow::{Context, anyhow};
use bytes::Bytes;
use dshare_backend::store::{BlobStore, StoreError, StoreResult};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Blob store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        LocalStore {
            base_path: base_path.into(),
        }
    }

    fn resolve_path(&self, path: &str) -> StoreResult<PathBuf> {
        if path.contains("..") || path.starts_with('/') {
            return Err(anyhow!(
                "Invalid path: '{}'. Must be a relative path without '..'.",
                path
            ));
        }
        Ok(self.base_path.join(path))
    }

    async fn open(&self, path: &str) -> StoreResult<File> {
        let full_path = self.resolve_path(path)?;
        match File::open(&full_path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound.into()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalStore {
    /// Writes to a sibling temp file first, then renames over the target.
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        let full_path = self.resolve_path(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = full_path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &full_path).await?;
        Ok(())
    }

    async fn open_read_bytes(
        &self,
        path: &str,
        offset: u64,
        max_len: Option<u64>,
    ) -> StoreResult<Bytes> {
        let mut file = self.open(path).await?;
        let file_len = file.metadata().await?.len();

        if offset >= file_len {
            return Ok(Bytes::new());
        }

        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let len_to_read = match max_len {
            Some(len) => std::cmp::min(len, file_len - offset),
            None => file_len - offset,
        };

        let capacity =
            usize::try_from(len_to_read).context("file segment too large to read into memory")?;
        let mut buffer = Vec::with_capacity(capacity);

        file.take(len_to_read).read_to_end(&mut buffer).await?;

        Ok(Bytes::from(buffer))
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let full_path = self.resolve_path(path)?;
        tokio::fs::try_exists(&full_path).await.map_err(Into::into)
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        Ok(self.open(path).await?.metadata().await?.len())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let full_path = self.resolve_path(path)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dshare_backend::testutil::BlobStoreTests;

    #[tokio::test]
    async fn test_local_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp_dir.path());
        BlobStoreTests::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp_dir.path());
        assert!(
            store
                .put_bytes("../outside", Bytes::from_static(b"x"))
                .await
                .is_err()
        );
        assert!(store.exists("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(temp_dir.path());
        let err = store.open_read_bytes("blobs/ab/abc", 0, None).await.unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }
}

use bytes::Bytes;
use dashmap::DashMap;
use dshare_backend::store::{BlobStore, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryStore {
    files: DashMap<String, Bytes>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryStore {
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        self.files.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn open_read_bytes(
        &self,
        path: &str,
        offset: u64,
        max_len: Option<u64>,
    ) -> StoreResult<Bytes> {
        let file = self.files.get(path).ok_or(StoreError::NotFound)?;
        let file_len = file.len();
        let start = usize::try_from(offset).unwrap_or(usize::MAX);

        if start >= file_len {
            return Ok(Bytes::new());
        }

        let remaining = file_len - start;
        let len = match max_len {
            Some(max) => remaining.min(usize::try_from(max).unwrap_or(usize::MAX)),
            None => remaining,
        };

        Ok(file.slice(start..start + len))
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.files.contains_key(path))
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        let file = self.files.get(path).ok_or(StoreError::NotFound)?;
        Ok(file.len() as u64)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.files.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dshare_backend::testutil::BlobStoreTests;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        BlobStoreTests::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let store = MemoryStore::new();
        let err = store.size("nope").await.unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }
}

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use dshare_core::FileId;

pub type StoreResult<T, E = anyhow::Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
}

/// Byte storage for blob contents.
///
/// Paths are relative, `/`-separated and never contain `..`.
#[async_trait]
pub trait BlobStore: std::fmt::Debug + Send + Sync + 'static {
    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()>;

    /// Reads up to `max_len` bytes starting at `offset`. Reading past the end
    /// yields an empty buffer.
    async fn open_read_bytes(
        &self,
        path: &str,
        offset: u64,
        max_len: Option<u64>,
    ) -> StoreResult<Bytes>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    async fn size(&self, path: &str) -> StoreResult<u64>;

    /// Deletes the object at `path`. Deleting a missing object is not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Store path of a blob: `blobs/<first two hex chars>/<did>`.
pub fn blob_path(id: &FileId) -> String {
    let did = id.as_str();
    let prefix = did.get(..2).unwrap_or(did);
    format!("blobs/{prefix}/{did}")
}

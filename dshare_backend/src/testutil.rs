//! Test utilities for `BlobStore` implementations.
//!
//! # Usage
//!
//! In your store crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! dshare_backend = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use dshare_backend::testutil::BlobStoreTests;
//!
//! #[tokio::test]
//! async fn test_my_store() {
//!     let store = MyStore::new(...);
//!     BlobStoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

use crate::store::{BlobStore, StoreResult};
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SUITE: AtomicU32 = AtomicU32::new(0);

/// Every path the suite writes, relative to its prefix.
const SUITE_FILES: [&str; 6] = [
    "bytes_test.bin",
    "exists_test.bin",
    "size_test.bin",
    "delete_test.bin",
    "partial_test.bin",
    "overwrite_test.bin",
];

/// Test suite for `BlobStore` implementations.
pub struct BlobStoreTests<'a, S> {
    store: &'a S,
    /// Prefix for test files to avoid conflicts
    prefix: String,
}

impl<'a, S: BlobStore> BlobStoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        let suite = NEXT_SUITE.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("_test_{}_{suite}/", std::process::id());
        Self { store, prefix }
    }

    pub fn with_prefix(store: &'a S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    fn path(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub async fn run_all(&self) -> StoreResult<()> {
        self.test_put_get_bytes().await?;
        self.test_exists().await?;
        self.test_size().await?;
        self.test_delete().await?;
        self.test_delete_missing().await?;
        self.test_partial_read().await?;
        self.test_overwrite().await?;

        self.cleanup().await?;
        Ok(())
    }

    pub async fn test_put_get_bytes(&self) -> StoreResult<()> {
        let path = self.path("bytes_test.bin");
        let data = Bytes::from_static(b"hello, world!");

        self.store.put_bytes(&path, data.clone()).await?;

        let retrieved = self.store.open_read_bytes(&path, 0, None).await?;
        assert_eq!(retrieved, data, "retrieved data should match original");
        Ok(())
    }

    pub async fn test_exists(&self) -> StoreResult<()> {
        let path = self.path("exists_test.bin");

        assert!(
            !self.store.exists(&path).await?,
            "file should not exist before creation"
        );
        self.store
            .put_bytes(&path, Bytes::from_static(b"test"))
            .await?;
        assert!(
            self.store.exists(&path).await?,
            "file should exist after creation"
        );
        Ok(())
    }

    pub async fn test_size(&self) -> StoreResult<()> {
        let path = self.path("size_test.bin");
        self.store
            .put_bytes(&path, Bytes::from(vec![42u8; 12345]))
            .await?;

        assert_eq!(self.store.size(&path).await?, 12345);
        Ok(())
    }

    pub async fn test_delete(&self) -> StoreResult<()> {
        let path = self.path("delete_test.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"to be deleted"))
            .await?;

        self.store.delete(&path).await?;

        assert!(
            !self.store.exists(&path).await?,
            "file should not exist after delete"
        );
        Ok(())
    }

    /// Deleting a path that was never written succeeds.
    pub async fn test_delete_missing(&self) -> StoreResult<()> {
        self.store.delete(&self.path("never_written.bin")).await?;
        Ok(())
    }

    pub async fn test_partial_read(&self) -> StoreResult<()> {
        let path = self.path("partial_test.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"0123456789abcdef"))
            .await?;

        let partial = self.store.open_read_bytes(&path, 5, None).await?;
        assert_eq!(partial.as_ref(), b"56789abcdef", "offset read should work");

        let partial = self.store.open_read_bytes(&path, 0, Some(5)).await?;
        assert_eq!(partial.as_ref(), b"01234", "length-limited read should work");

        let partial = self.store.open_read_bytes(&path, 4, Some(4)).await?;
        assert_eq!(partial.as_ref(), b"4567", "offset + length read should work");

        let past_end = self.store.open_read_bytes(&path, 100, Some(4)).await?;
        assert!(past_end.is_empty(), "reading past the end should be empty");
        Ok(())
    }

    pub async fn test_overwrite(&self) -> StoreResult<()> {
        let path = self.path("overwrite_test.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"original content"))
            .await?;
        self.store
            .put_bytes(&path, Bytes::from_static(b"new content"))
            .await?;

        let retrieved = self.store.open_read_bytes(&path, 0, None).await?;
        assert_eq!(retrieved.as_ref(), b"new content");
        Ok(())
    }

    pub async fn cleanup(&self) -> StoreResult<()> {
        for name in SUITE_FILES {
            self.store.delete(&self.path(name)).await?;
        }
        Ok(())
    }
}

//! Reference identity and storage provider for dshare.
//!
//! [`Backend`] enforces ownership, grants and quotas over two persistence
//! seams, a [`BlobStore`] for content and a [`Ledger`] for metadata.
//! [`Client`] is one user's view of a backend and implements both
//! [`dshare_core::IdentityProvider`] and [`dshare_core::StorageProvider`].
//!
//! Store implementations live in `dshare_store_memory` and
//! `dshare_store_local`; a persistent ledger lives in `dshare_ledger_redb`.

pub mod backend;
pub mod client;
pub mod error;
pub mod ledger;
pub mod store;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use backend::{Backend, QuotaLimits};
pub use client::Client;
pub use error::BackendError;
pub use ledger::{FileRecord, Ledger, MemoryLedger};
pub use store::{BlobStore, StoreError, StoreResult, blob_path};

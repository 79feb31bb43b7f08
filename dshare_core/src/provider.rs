//! Collaborator interfaces the core consumes.
//!
//! These traits describe the external identity and storage providers. The core
//! never assumes anything about how they are implemented: a hosted SDK, the
//! reference backend in `dshare_backend`, or a scripted fake in tests.
//!
//! All provider methods report failures as [`anyhow::Error`]. The components
//! in this crate turn them into the typed errors of [`crate::error`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use tokio::sync::broadcast;

use crate::address::{PublicKey, RecipientAddress};
use crate::file::{FileId, SharedFile, StoredFile};

/// How a user authenticates with the identity provider.
#[derive(Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LoginMethod {
    /// Login delegated to a social provider (e.g. "google").
    Social { provider: String, email: String },
    /// Deterministic account keys recovered from a BIP39 phrase.
    SeedPhrase { email: String, phrase: String },
}

impl fmt::Debug for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginMethod::Social { provider, email } => f
                .debug_struct("Social")
                .field("provider", provider)
                .field("email", email)
                .finish(),
            LoginMethod::SeedPhrase { email, .. } => f
                .debug_struct("SeedPhrase")
                .field("email", email)
                .finish_non_exhaustive(),
        }
    }
}

/// Profile of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub name: Option<String>,
    pub public_key: PublicKey,
}

impl UserProfile {
    /// Wallet address of this user, derived locally from the public key.
    pub fn address(&self) -> RecipientAddress {
        self.public_key.address()
    }
}

/// Events pushed by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session ended (logout, expiry, provider teardown). The host must
    /// clear all local state and re-authenticate.
    Disconnect,
}

/// Identity/auth provider.
#[async_trait]
pub trait IdentityProvider: fmt::Debug + Send + Sync {
    async fn is_logged_in(&self) -> anyhow::Result<bool>;

    async fn login(&self, method: LoginMethod) -> anyhow::Result<()>;

    async fn logout(&self) -> anyhow::Result<()>;

    async fn current_user(&self) -> anyhow::Result<UserProfile>;

    /// Looks up the public key registered for `identifier`.
    ///
    /// Returns `Ok(None)` when no identity is registered; `Err` is reserved
    /// for transport or provider failures.
    async fn lookup_public_key(&self, identifier: &str) -> anyhow::Result<Option<PublicKey>>;

    /// Subscribes to session events such as [`SessionEvent::Disconnect`].
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// One step of an upload or download.
///
/// A transfer yields zero or more `Progress` events followed by exactly one
/// terminal `Finished` or `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent<T> {
    Progress { transferred: u64, total: u64 },
    Finished(T),
    Failed(String),
}

/// Finite, non-restartable stream of transfer events.
pub type TransferEvents<T> = Pin<Box<dyn Stream<Item = TransferEvent<T>> + Send + 'static>>;

/// Body of an upload: chunks of bytes.
pub type UploadBody =
    Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static>;

/// A file handed to the uploader.
pub struct UploadSource {
    pub name: String,
    /// Declared size in bytes; checked against the upload limit before the
    /// body is read.
    pub size: u64,
    pub body: UploadBody,
}

impl UploadSource {
    pub fn new(name: impl Into<String>, size: u64, body: UploadBody) -> Self {
        Self {
            name: name.into(),
            size,
            body,
        }
    }

    /// Upload source for an in-memory buffer, sent as a single chunk.
    pub fn from_bytes(name: impl Into<String>, bytes: Bytes) -> Self {
        let size = bytes.len() as u64;
        let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(bytes)]);
        Self::new(name, size, Box::new(body))
    }

    /// Upload source for an in-memory buffer, split into `chunk_size` pieces.
    pub fn from_chunks(name: impl Into<String>, bytes: Bytes, chunk_size: usize) -> Self {
        let size = bytes.len() as u64;
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + chunk_size).min(bytes.len());
            chunks.push(Ok::<_, std::io::Error>(bytes.slice(offset..end)));
            offset = end;
        }
        Self::new(name, size, Box::new(futures::stream::iter(chunks)))
    }
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Starts uploading `source`. The returned stream finishes with the new
    /// file's id.
    async fn upload(&self, source: UploadSource) -> anyhow::Result<TransferEvents<FileId>>;
}

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Starts downloading `file`. The returned stream finishes with its bytes.
    async fn download(&self, file: &FileId) -> anyhow::Result<TransferEvents<Bytes>>;
}

/// Access-control capability for the current account.
///
/// Handles are short-lived: obtain one per operation through
/// [`StorageProvider::access`] and drop it afterwards.
#[async_trait]
pub trait AccessHandle: Send + Sync {
    async fn grant(&self, file: &FileId, recipient: &RecipientAddress) -> anyhow::Result<()>;

    async fn revoke(&self, file: &FileId, recipient: &RecipientAddress) -> anyhow::Result<()>;

    async fn list_grantees(&self, file: &FileId) -> anyhow::Result<Vec<RecipientAddress>>;

    async fn transfer_ownership(
        &self,
        file: &FileId,
        recipient: &RecipientAddress,
    ) -> anyhow::Result<()>;

    async fn delete(&self, file: &FileId) -> anyhow::Result<()>;

    /// `(storage_used, total_storage)` in bytes.
    async fn upload_limit(&self) -> anyhow::Result<(u64, u64)>;

    /// `(bandwidth_used, total_bandwidth)` in bytes.
    async fn download_limit(&self) -> anyhow::Result<(u64, u64)>;
}

/// Storage provider acting on behalf of the logged-in user.
#[async_trait]
pub trait StorageProvider: fmt::Debug + Send + Sync {
    async fn list_mine(&self) -> anyhow::Result<Vec<StoredFile>>;

    async fn list_shared(&self) -> anyhow::Result<Vec<SharedFile>>;

    async fn uploader(&self) -> anyhow::Result<Box<dyn Uploader>>;

    async fn downloader(&self) -> anyhow::Result<Box<dyn Downloader>>;

    async fn access(&self) -> anyhow::Result<Box<dyn AccessHandle>>;
}

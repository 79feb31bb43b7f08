//! Ownership, grant and quota rules over a [`BlobStore`] and a [`Ledger`].
//!
//! Every mutating operation runs under one async write lock, so checks and
//! the writes that depend on them never interleave with another writer.

use bytes::Bytes;
use dshare_core::{FileId, PublicKey, RecipientAddress};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::ledger::{FileRecord, Ledger};
use crate::store::{BlobStore, blob_path};

/// 5 GiB.
pub const DEFAULT_TOTAL_STORAGE: u64 = 5 * 1024 * 1024 * 1024;
/// 5 GiB.
pub const DEFAULT_TOTAL_BANDWIDTH: u64 = 5 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub total_storage: u64,
    pub total_bandwidth: u64,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            total_storage: DEFAULT_TOTAL_STORAGE,
            total_bandwidth: DEFAULT_TOTAL_BANDWIDTH,
        }
    }
}

/// Emails are matched after trimming, case-insensitively.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[derive(Debug)]
pub struct Backend {
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<dyn Ledger>,
    limits: QuotaLimits,
    writes: Mutex<()>,
}

impl Backend {
    pub fn new(blobs: Arc<dyn BlobStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            blobs,
            ledger,
            limits: QuotaLimits::default(),
            writes: Mutex::new(()),
        }
    }

    pub fn with_limits(mut self, limits: QuotaLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Registers `public_key` for `email`. Re-registering the same key is a
    /// no-op; a different key is rejected.
    pub async fn register_identity(
        &self,
        email: &str,
        public_key: PublicKey,
    ) -> anyhow::Result<()> {
        let email = normalize_identifier(email);
        let _write = self.writes.lock().await;
        match self.ledger.get_identity(&email).await? {
            Some(existing) if existing == public_key => Ok(()),
            Some(_) => Err(BackendError::IdentityConflict { email }.into()),
            None => {
                info!(%email, address = %public_key.address(), "registered identity");
                self.ledger.put_identity(&email, public_key).await
            }
        }
    }

    pub async fn lookup_identity(&self, email: &str) -> anyhow::Result<Option<PublicKey>> {
        self.ledger
            .get_identity(&normalize_identifier(email))
            .await
    }

    async fn record(&self, id: &FileId) -> anyhow::Result<FileRecord> {
        self.ledger
            .get_file(id)
            .await?
            .ok_or_else(|| BackendError::UnknownFile(id.clone()).into())
    }

    async fn owned_record(
        &self,
        id: &FileId,
        caller: &RecipientAddress,
    ) -> anyhow::Result<FileRecord> {
        let record = self.record(id).await?;
        if !record.is_owned_by(caller) {
            return Err(BackendError::NotOwner {
                file: id.clone(),
                caller: caller.clone(),
            }
            .into());
        }
        Ok(record)
    }

    pub async fn files_owned_by(&self, account: &RecipientAddress) -> anyhow::Result<Vec<FileRecord>> {
        let files = self.ledger.list_files().await?;
        Ok(files.into_iter().filter(|f| f.is_owned_by(account)).collect())
    }

    pub async fn files_shared_with(
        &self,
        account: &RecipientAddress,
    ) -> anyhow::Result<Vec<FileRecord>> {
        let files = self.ledger.list_files().await?;
        Ok(files
            .into_iter()
            .filter(|f| !f.is_owned_by(account) && f.is_granted_to(account))
            .collect())
    }

    pub async fn storage_used(&self, account: &RecipientAddress) -> anyhow::Result<u64> {
        let files = self.files_owned_by(account).await?;
        Ok(files.iter().map(|f| f.size).sum())
    }

    pub async fn bandwidth_used(&self, account: &RecipientAddress) -> anyhow::Result<u64> {
        self.ledger.bandwidth_used(account).await
    }

    /// Stores `content` owned by `owner`. The id is the hex BLAKE3 hash of
    /// the content.
    pub async fn store(&self, owner: &RecipientAddress, content: Bytes) -> anyhow::Result<FileRecord> {
        let id = FileId::new(blake3::hash(&content).to_hex().to_string());
        let size = content.len() as u64;

        let _write = self.writes.lock().await;
        if self.ledger.get_file(&id).await?.is_some() {
            return Err(BackendError::Duplicate(id).into());
        }
        let used = self.storage_used(owner).await?;
        let available = self.limits.total_storage.saturating_sub(used);
        if size > available {
            return Err(BackendError::StorageQuotaExceeded {
                needed: size,
                available,
            }
            .into());
        }

        self.blobs.put_bytes(&blob_path(&id), content).await?;
        let record = FileRecord::new(id, owner.clone(), size);
        self.ledger.put_file(record.clone()).await?;
        debug!(file = %record.id, %owner, size, "stored file");
        Ok(record)
    }

    /// Checks read access for `reader` and charges the file's size against
    /// their bandwidth. Returns the record to stream from.
    pub async fn begin_download(
        &self,
        reader: &RecipientAddress,
        id: &FileId,
    ) -> anyhow::Result<FileRecord> {
        let _write = self.writes.lock().await;
        let record = self.record(id).await?;
        if !record.can_read(reader) {
            return Err(BackendError::NoAccess {
                file: id.clone(),
                caller: reader.clone(),
            }
            .into());
        }
        let used = self.ledger.bandwidth_used(reader).await?;
        let available = self.limits.total_bandwidth.saturating_sub(used);
        if record.size > available {
            return Err(BackendError::BandwidthQuotaExceeded {
                needed: record.size,
                available,
            }
            .into());
        }
        self.ledger.add_bandwidth(reader, record.size).await?;
        debug!(file = %id, %reader, size = record.size, "download authorised");
        Ok(record)
    }

    pub async fn read_slice(&self, id: &FileId, offset: u64, len: u64) -> anyhow::Result<Bytes> {
        self.blobs
            .open_read_bytes(&blob_path(id), offset, Some(len))
            .await
    }

    pub async fn grant(
        &self,
        caller: &RecipientAddress,
        id: &FileId,
        recipient: &RecipientAddress,
    ) -> anyhow::Result<()> {
        let _write = self.writes.lock().await;
        let mut record = self.owned_record(id, caller).await?;
        if record.is_granted_to(recipient) {
            return Ok(());
        }
        record.grantees.push(recipient.clone());
        self.ledger.put_file(record).await
    }

    /// Revoking an address that holds no grant succeeds.
    pub async fn revoke(
        &self,
        caller: &RecipientAddress,
        id: &FileId,
        recipient: &RecipientAddress,
    ) -> anyhow::Result<()> {
        let _write = self.writes.lock().await;
        let mut record = self.owned_record(id, caller).await?;
        let before = record.grantees.len();
        record.grantees.retain(|a| a != recipient);
        if record.grantees.len() == before {
            return Ok(());
        }
        self.ledger.put_file(record).await
    }

    pub async fn list_grantees(
        &self,
        caller: &RecipientAddress,
        id: &FileId,
    ) -> anyhow::Result<Vec<RecipientAddress>> {
        Ok(self.owned_record(id, caller).await?.grantees)
    }

    /// Hands the file to `recipient` and drops every grant.
    pub async fn transfer(
        &self,
        caller: &RecipientAddress,
        id: &FileId,
        recipient: &RecipientAddress,
    ) -> anyhow::Result<()> {
        let _write = self.writes.lock().await;
        let mut record = self.owned_record(id, caller).await?;
        record.owner = recipient.clone();
        record.grantees.clear();
        self.ledger.put_file(record).await?;
        info!(file = %id, from = %caller, to = %recipient, "ownership transferred");
        Ok(())
    }

    /// Removes the blob bytes and the record.
    pub async fn delete(&self, caller: &RecipientAddress, id: &FileId) -> anyhow::Result<()> {
        let _write = self.writes.lock().await;
        self.owned_record(id, caller).await?;
        self.blobs.delete(&blob_path(id)).await?;
        self.ledger.remove_file(id).await?;
        info!(file = %id, owner = %caller, "deleted file");
        Ok(())
    }
}

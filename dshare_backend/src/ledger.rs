//! Metadata ledger: file records, registered identities and bandwidth usage.

use async_trait::async_trait;
use dshare_core::{FileId, PublicKey, RecipientAddress, StoredFile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

/// Ownership and grant state of one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner: RecipientAddress,
    pub created_at: SystemTime,
    pub size: u64,
    pub grantees: Vec<RecipientAddress>,
}

impl FileRecord {
    pub fn new(id: FileId, owner: RecipientAddress, size: u64) -> Self {
        Self {
            id,
            owner,
            created_at: SystemTime::now(),
            size,
            grantees: Vec::new(),
        }
    }

    pub fn is_owned_by(&self, account: &RecipientAddress) -> bool {
        &self.owner == account
    }

    pub fn is_granted_to(&self, account: &RecipientAddress) -> bool {
        self.grantees.contains(account)
    }

    pub fn can_read(&self, account: &RecipientAddress) -> bool {
        self.is_owned_by(account) || self.is_granted_to(account)
    }

    pub fn to_stored(&self) -> StoredFile {
        StoredFile::new(self.id.clone(), self.created_at, self.size)
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(postcard::to_stdvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[async_trait]
pub trait Ledger: std::fmt::Debug + Send + Sync + 'static {
    async fn get_file(&self, id: &FileId) -> anyhow::Result<Option<FileRecord>>;

    /// Inserts or replaces the record with the same id.
    async fn put_file(&self, record: FileRecord) -> anyhow::Result<()>;

    async fn remove_file(&self, id: &FileId) -> anyhow::Result<Option<FileRecord>>;

    async fn list_files(&self) -> anyhow::Result<Vec<FileRecord>>;

    /// Public key registered for a normalised email.
    async fn get_identity(&self, email: &str) -> anyhow::Result<Option<PublicKey>>;

    async fn put_identity(&self, email: &str, public_key: PublicKey) -> anyhow::Result<()>;

    async fn bandwidth_used(&self, account: &RecipientAddress) -> anyhow::Result<u64>;

    /// Adds `bytes` to the account's counter and returns the new total.
    async fn add_bandwidth(&self, account: &RecipientAddress, bytes: u64) -> anyhow::Result<u64>;
}

#[derive(Debug, Default)]
struct LedgerData {
    files: HashMap<FileId, FileRecord>,
    identities: HashMap<String, PublicKey>,
    bandwidth: HashMap<RecipientAddress, u64>,
}

/// Ledger that lives for the duration of the process.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    data: RwLock<LedgerData>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn get_file(&self, id: &FileId) -> anyhow::Result<Option<FileRecord>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.files.get(id).cloned())
    }

    async fn put_file(&self, record: FileRecord) -> anyhow::Result<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.files.insert(record.id.clone(), record);
        Ok(())
    }

    async fn remove_file(&self, id: &FileId) -> anyhow::Result<Option<FileRecord>> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        Ok(data.files.remove(id))
    }

    async fn list_files(&self) -> anyhow::Result<Vec<FileRecord>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut files: Vec<FileRecord> = data.files.values().cloned().collect();
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn get_identity(&self, email: &str) -> anyhow::Result<Option<PublicKey>> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.identities.get(email).cloned())
    }

    async fn put_identity(&self, email: &str, public_key: PublicKey) -> anyhow::Result<()> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.identities.insert(email.to_string(), public_key);
        Ok(())
    }

    async fn bandwidth_used(&self, account: &RecipientAddress) -> anyhow::Result<u64> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data.bandwidth.get(account).copied().unwrap_or(0))
    }

    async fn add_bandwidth(&self, account: &RecipientAddress, bytes: u64) -> anyhow::Result<u64> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let used = data.bandwidth.entry(account.clone()).or_insert(0);
        *used = used.saturating_add(bytes);
        Ok(*used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> RecipientAddress {
        PublicKey::from([7u8; 32]).address()
    }

    #[test]
    fn record_survives_postcard() {
        let mut record = FileRecord::new(FileId::new("abc"), owner(), 12);
        record.grantees.push(PublicKey::from([8u8; 32]).address());
        let decoded = FileRecord::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[tokio::test]
    async fn bandwidth_accumulates_per_account() {
        let ledger = MemoryLedger::new();
        let other = PublicKey::from([9u8; 32]).address();
        assert_eq!(ledger.add_bandwidth(&owner(), 10).await.unwrap(), 10);
        assert_eq!(ledger.add_bandwidth(&owner(), 5).await.unwrap(), 15);
        assert_eq!(ledger.bandwidth_used(&other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn remove_returns_the_record() {
        let ledger = MemoryLedger::new();
        let record = FileRecord::new(FileId::new("abc"), owner(), 1);
        ledger.put_file(record.clone()).await.unwrap();
        assert_eq!(
            ledger.remove_file(&record.id).await.unwrap(),
            Some(record.clone())
        );
        assert_eq!(ledger.remove_file(&record.id).await.unwrap(), None);
    }
}

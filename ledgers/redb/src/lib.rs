//! RedbLedger - A persistent ledger implementation backed by redb.

use dshare_backend::{FileRecord, Ledger};
use dshare_core::{FileId, PublicKey, RecipientAddress};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::{path::Path, sync::Arc};

const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const IDENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("identities");
const BANDWIDTH: TableDefinition<&str, u64> = TableDefinition::new("bandwidth");

/// Local `Ledger` implementation backed by a Redb database.
///
/// File records are stored postcard-encoded, keyed by file id.
#[derive(Clone)]
pub struct RedbLedger {
    db: Arc<Database>,
}

impl RedbLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let db = Database::create(path.join("ledger.redb"))?;

        // Create every table up front so the first access may be a read.
        {
            let write_txn = db.begin_write()?;
            {
                let _ = write_txn.open_table(FILES)?;
                let _ = write_txn.open_table(IDENTITIES)?;
                let _ = write_txn.open_table(BANDWIDTH)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, task: &'static str, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow::anyhow!("redb {} task failed: {}", task, e))?
    }
}

impl std::fmt::Debug for RedbLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbLedger").finish()
    }
}

#[async_trait::async_trait]
impl Ledger for RedbLedger {
    async fn get_file(&self, id: &FileId) -> anyhow::Result<Option<FileRecord>> {
        let id = id.clone();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(FILES)?;
            let record = table
                .get(id.as_str())?
                .map(|guard| FileRecord::from_bytes(guard.value()))
                .transpose()?;
            Ok(record)
        })
        .await
    }

    async fn put_file(&self, record: FileRecord) -> anyhow::Result<()> {
        self.blocking("write", move |db| {
            let bytes = record.to_bytes()?;
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(FILES)?;
                table.insert(record.id.as_str(), bytes.as_slice())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn remove_file(&self, id: &FileId) -> anyhow::Result<Option<FileRecord>> {
        let id = id.clone();
        self.blocking("delete", move |db| {
            let write_txn = db.begin_write()?;
            let removed = {
                let mut table = write_txn.open_table(FILES)?;
                table
                    .remove(id.as_str())?
                    .map(|guard| FileRecord::from_bytes(guard.value()))
                    .transpose()?
            };
            write_txn.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn list_files(&self) -> anyhow::Result<Vec<FileRecord>> {
        self.blocking("read", |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(FILES)?;
            let mut files = Vec::new();
            for entry in table.iter()? {
                let (_key, value) = entry?;
                files.push(FileRecord::from_bytes(value.value())?);
            }
            files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(files)
        })
        .await
    }

    async fn get_identity(&self, email: &str) -> anyhow::Result<Option<PublicKey>> {
        let email = email.to_string();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(IDENTITIES)?;
            let key = table
                .get(email.as_str())?
                .map(|guard| PublicKey::new(guard.value()));
            Ok(key)
        })
        .await
    }

    async fn put_identity(&self, email: &str, public_key: PublicKey) -> anyhow::Result<()> {
        let email = email.to_string();
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(IDENTITIES)?;
                table.insert(email.as_str(), public_key.as_bytes())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn bandwidth_used(&self, account: &RecipientAddress) -> anyhow::Result<u64> {
        let account = account.clone();
        self.blocking("read", move |db| {
            let read_txn = db.begin_read()?;
            let table = read_txn.open_table(BANDWIDTH)?;
            let used = table.get(account.as_str())?.map(|guard| guard.value());
            Ok(used.unwrap_or(0))
        })
        .await
    }

    async fn add_bandwidth(&self, account: &RecipientAddress, bytes: u64) -> anyhow::Result<u64> {
        let account = account.clone();
        self.blocking("write", move |db| {
            let write_txn = db.begin_write()?;
            let total = {
                let mut table = write_txn.open_table(BANDWIDTH)?;
                let used = table.get(account.as_str())?.map(|guard| guard.value());
                let total = used.unwrap_or(0).saturating_add(bytes);
                table.insert(account.as_str(), total)?;
                total
            };
            write_txn.commit()?;
            Ok(total)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(seed: u8) -> RecipientAddress {
        PublicKey::from([seed; 32]).address()
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = FileRecord::new(FileId::new("abcdef"), address(1), 42);
        record.grantees.push(address(2));

        {
            let ledger = RedbLedger::open(dir.path()).unwrap();
            ledger.put_file(record.clone()).await.unwrap();
            ledger
                .put_identity("alice@example.com", PublicKey::from([1u8; 32]))
                .await
                .unwrap();
            ledger.add_bandwidth(&address(1), 100).await.unwrap();
        }

        let ledger = RedbLedger::open(dir.path()).unwrap();
        assert_eq!(
            ledger.get_file(&record.id).await.unwrap(),
            Some(record.clone())
        );
        assert_eq!(ledger.list_files().await.unwrap(), vec![record.clone()]);
        assert_eq!(
            ledger.get_identity("alice@example.com").await.unwrap(),
            Some(PublicKey::from([1u8; 32]))
        );
        assert_eq!(ledger.add_bandwidth(&address(1), 5).await.unwrap(), 105);
    }

    #[tokio::test]
    async fn fresh_database_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path()).unwrap();
        assert!(ledger.list_files().await.unwrap().is_empty());
        assert_eq!(ledger.bandwidth_used(&address(3)).await.unwrap(), 0);
        assert!(ledger.get_identity("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_returns_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RedbLedger::open(dir.path()).unwrap();
        let record = FileRecord::new(FileId::new("abc"), address(1), 1);
        ledger.put_file(record.clone()).await.unwrap();

        assert_eq!(ledger.remove_file(&record.id).await.unwrap(), Some(record));
        assert!(ledger.get_file(&FileId::new("abc")).await.unwrap().is_none());
    }
}

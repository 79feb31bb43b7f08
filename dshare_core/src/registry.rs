//! Local view of the user's files.
//!
//! The registry is the only place that holds the "mine" and "shared" sets.
//! It is updated two ways:
//!
//! - **refresh**: the backing store's listing fully replaces the local set;
//! - **optimistic mutation**: `add_mine` / `remove_mine` right after a local
//!   action succeeded, without waiting for the next refresh.
//!
//! All state sits behind one lock. Listings are fetched before the lock is
//! taken, so a refresh never holds it across a remote call, and the
//! replacement itself is applied atomically.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::file::{FileId, SharedFile, StoredFile};
use crate::provider::StorageProvider;
use crate::quota::QuotaSnapshot;

#[derive(Debug, Default)]
struct RegistryState {
    mine: Vec<StoredFile>,
    shared: Vec<SharedFile>,
    quota: Option<QuotaSnapshot>,
}

#[derive(Debug, Default)]
pub struct FileRegistry {
    state: RwLock<RegistryState>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the "mine" set with the backing store's current listing.
    pub async fn refresh_mine(
        &self,
        storage: &dyn StorageProvider,
    ) -> anyhow::Result<Vec<StoredFile>> {
        let files = storage.list_mine().await?;
        self.replace_mine(files.clone());
        Ok(files)
    }

    /// Replaces the "shared with me" set with the backing store's listing.
    pub async fn refresh_shared(
        &self,
        storage: &dyn StorageProvider,
    ) -> anyhow::Result<Vec<SharedFile>> {
        let files = storage.list_shared().await?;
        self.replace_shared(files.clone());
        Ok(files)
    }

    pub fn replace_mine(&self, files: Vec<StoredFile>) {
        debug!(count = files.len(), "replacing owned files");
        self.write().mine = files;
    }

    pub fn replace_shared(&self, files: Vec<SharedFile>) {
        debug!(count = files.len(), "replacing shared files");
        self.write().shared = files;
    }

    /// Records a file the user now owns. An entry with the same id is replaced.
    pub fn add_mine(&self, file: StoredFile) {
        let mut state = self.write();
        match state.mine.iter_mut().find(|f| f.id == file.id) {
            Some(existing) => *existing = file,
            None => state.mine.push(file),
        }
    }

    /// Forgets a file the user no longer owns.
    ///
    /// Idempotent: returns `false` and leaves the registry untouched when the
    /// file is already absent.
    pub fn remove_mine(&self, id: &FileId) -> bool {
        let mut state = self.write();
        let before = state.mine.len();
        state.mine.retain(|f| &f.id != id);
        state.mine.len() != before
    }

    pub fn snapshot_quota(&self, quota: QuotaSnapshot) {
        self.write().quota = Some(quota);
    }

    pub fn mine(&self) -> Vec<StoredFile> {
        self.read().mine.clone()
    }

    pub fn shared(&self) -> Vec<SharedFile> {
        self.read().shared.clone()
    }

    pub fn quota(&self) -> Option<QuotaSnapshot> {
        self.read().quota
    }

    pub fn contains_mine(&self, id: &FileId) -> bool {
        self.read().mine.iter().any(|f| &f.id == id)
    }

    /// Drops everything, e.g. after the session disconnected.
    pub fn clear(&self) {
        *self.write() = RegistryState::default();
    }
}

//! Test utilities for workflow code.
//!
//! # Usage
//!
//! In your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! dshare_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! - [`RecordingSignals`] records every notification and busy transition.
//! - [`ScriptedIdentity`] and [`ScriptedStorage`] are in-memory providers that
//!   log every call and can be told to fail specific operations.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::{Semaphore, broadcast};

use crate::address::{PublicKey, RecipientAddress};
use crate::file::{FileId, SharedFile, StoredFile};
use crate::provider::{
    AccessHandle, Downloader, IdentityProvider, LoginMethod, SessionEvent, StorageProvider,
    TransferEvent, TransferEvents, UploadSource, Uploader, UserProfile,
};
use crate::signal::{Notifier, ProgressSurface};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Signals
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    Success(String),
    Error(String),
    SetBusy(String),
    UpdateBusy(String),
    ClearBusy,
}

/// Notifier + progress surface that records everything it is told.
#[derive(Debug, Default)]
pub struct RecordingSignals {
    events: Mutex<Vec<SignalEvent>>,
}

impl RecordingSignals {
    pub fn events(&self) -> Vec<SignalEvent> {
        lock(&self.events).clone()
    }

    fn count(&self, pred: impl Fn(&SignalEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| pred(e)).count()
    }

    pub fn busy_set_count(&self) -> usize {
        self.count(|e| matches!(e, SignalEvent::SetBusy(_)))
    }

    pub fn busy_clear_count(&self) -> usize {
        self.count(|e| matches!(e, SignalEvent::ClearBusy))
    }

    pub fn successes(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                SignalEvent::Success(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                SignalEvent::Error(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Labels passed to `update_busy`, in order.
    pub fn busy_updates(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                SignalEvent::UpdateBusy(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits (yielding to the runtime) until the busy indicator was cleared
    /// `expected` times.
    pub async fn wait_for_clears(&self, expected: usize) {
        while self.busy_clear_count() < expected {
            tokio::task::yield_now().await;
        }
    }
}

impl Notifier for RecordingSignals {
    fn notify_success(&self, message: &str) {
        lock(&self.events).push(SignalEvent::Success(message.to_string()));
    }

    fn notify_error(&self, message: &str) {
        lock(&self.events).push(SignalEvent::Error(message.to_string()));
    }
}

impl ProgressSurface for RecordingSignals {
    fn set_busy(&self, label: &str) {
        lock(&self.events).push(SignalEvent::SetBusy(label.to_string()));
    }

    fn update_busy(&self, label: &str) {
        lock(&self.events).push(SignalEvent::UpdateBusy(label.to_string()));
    }

    fn clear_busy(&self) {
        lock(&self.events).push(SignalEvent::ClearBusy);
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Identity provider backed by a fixed email → public key table.
#[derive(Debug)]
pub struct ScriptedIdentity {
    keys: Mutex<HashMap<String, PublicKey>>,
    lookups: Mutex<Vec<String>>,
    lookup_failure: Mutex<Option<String>>,
    current: Mutex<Option<UserProfile>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for ScriptedIdentity {
    fn default() -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            keys: Mutex::default(),
            lookups: Mutex::default(),
            lookup_failure: Mutex::default(),
            current: Mutex::default(),
            events,
        }
    }
}

impl ScriptedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `email` and returns the address it resolves to.
    pub fn register(&self, email: &str, public_key: PublicKey) -> RecipientAddress {
        let address = public_key.address();
        lock(&self.keys).insert(email.to_string(), public_key);
        address
    }

    /// Makes every following lookup fail with a provider error.
    pub fn fail_lookups(&self, message: &str) {
        *lock(&self.lookup_failure) = Some(message.to_string());
    }

    pub fn lookups(&self) -> Vec<String> {
        lock(&self.lookups).clone()
    }

    /// Simulates the provider dropping the session.
    pub fn disconnect(&self) {
        *lock(&self.current) = None;
        let _ = self.events.send(SessionEvent::Disconnect);
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentity {
    async fn is_logged_in(&self) -> anyhow::Result<bool> {
        Ok(lock(&self.current).is_some())
    }

    async fn login(&self, method: LoginMethod) -> anyhow::Result<()> {
        let email = match method {
            LoginMethod::Social { email, .. } | LoginMethod::SeedPhrase { email, .. } => email,
        };
        let public_key = lock(&self.keys)
            .get(&email)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown account {email}"))?;
        *lock(&self.current) = Some(UserProfile {
            email,
            name: None,
            public_key,
        });
        Ok(())
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.disconnect();
        Ok(())
    }

    async fn current_user(&self) -> anyhow::Result<UserProfile> {
        lock(&self.current)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("not logged in"))
    }

    async fn lookup_public_key(&self, identifier: &str) -> anyhow::Result<Option<PublicKey>> {
        lock(&self.lookups).push(identifier.to_string());
        if let Some(message) = lock(&self.lookup_failure).clone() {
            anyhow::bail!(message);
        }
        Ok(lock(&self.keys).get(identifier).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Kind of storage call, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageOp {
    ListMine,
    ListShared,
    Uploader,
    Upload,
    Downloader,
    Download,
    Access,
    Grant,
    Revoke,
    ListGrantees,
    TransferOwnership,
    Delete,
    UploadLimit,
    DownloadLimit,
}

/// One recorded storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    ListMine,
    ListShared,
    Uploader,
    Upload { name: String, size: u64 },
    Downloader,
    Download(FileId),
    Access,
    Grant(FileId, RecipientAddress),
    Revoke(FileId, RecipientAddress),
    ListGrantees(FileId),
    TransferOwnership(FileId, RecipientAddress),
    Delete(FileId),
    UploadLimit,
    DownloadLimit,
}

impl StorageCall {
    pub fn op(&self) -> StorageOp {
        match self {
            StorageCall::ListMine => StorageOp::ListMine,
            StorageCall::ListShared => StorageOp::ListShared,
            StorageCall::Uploader => StorageOp::Uploader,
            StorageCall::Upload { .. } => StorageOp::Upload,
            StorageCall::Downloader => StorageOp::Downloader,
            StorageCall::Download(_) => StorageOp::Download,
            StorageCall::Access => StorageOp::Access,
            StorageCall::Grant(..) => StorageOp::Grant,
            StorageCall::Revoke(..) => StorageOp::Revoke,
            StorageCall::ListGrantees(_) => StorageOp::ListGrantees,
            StorageCall::TransferOwnership(..) => StorageOp::TransferOwnership,
            StorageCall::Delete(_) => StorageOp::Delete,
            StorageCall::UploadLimit => StorageOp::UploadLimit,
            StorageCall::DownloadLimit => StorageOp::DownloadLimit,
        }
    }

    /// True for calls made through an access handle.
    pub fn is_access_call(&self) -> bool {
        matches!(
            self.op(),
            StorageOp::Access
                | StorageOp::Grant
                | StorageOp::Revoke
                | StorageOp::ListGrantees
                | StorageOp::TransferOwnership
                | StorageOp::Delete
        )
    }
}

#[derive(Debug, Default)]
struct ScriptedState {
    calls: Mutex<Vec<StorageCall>>,
    failing: Mutex<HashSet<StorageOp>>,
    panicking: Mutex<HashSet<StorageOp>>,
    uploaded_bytes: Mutex<u64>,
    mine: Mutex<Vec<StoredFile>>,
    shared: Mutex<Vec<SharedFile>>,
    contents: Mutex<HashMap<FileId, Bytes>>,
    grantees: Mutex<HashMap<FileId, Vec<RecipientAddress>>>,
    next_upload_id: Mutex<Option<FileId>>,
    upload_script: Mutex<Option<Vec<TransferEvent<FileId>>>>,
    limits: Mutex<((u64, u64), (u64, u64))>,
    access_gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedState {
    fn record(&self, call: StorageCall) -> anyhow::Result<()> {
        let op = call.op();
        lock(&self.calls).push(call);
        if lock(&self.panicking).contains(&op) {
            panic!("scripted panic: {op:?}");
        }
        if lock(&self.failing).contains(&op) {
            anyhow::bail!("scripted failure: {op:?}");
        }
        Ok(())
    }

    async fn pass_gate(&self) {
        let gate = lock(&self.access_gate).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }
}

/// Storage provider that keeps everything in memory and logs every call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStorage {
    state: Arc<ScriptedState>,
}

impl ScriptedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        lock(&self.state.calls).clone()
    }

    pub fn count(&self, op: StorageOp) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.op() == op)
            .count()
    }

    pub fn access_calls(&self) -> usize {
        lock(&self.state.calls)
            .iter()
            .filter(|c| c.is_access_call())
            .count()
    }

    pub fn fail(&self, op: StorageOp) {
        lock(&self.state.failing).insert(op);
    }

    /// Makes every following call of `op` panic.
    pub fn panic_on(&self, op: StorageOp) {
        lock(&self.state.panicking).insert(op);
    }

    /// Body bytes accepted by successful uploads so far.
    pub fn uploaded_bytes(&self) -> u64 {
        *lock(&self.state.uploaded_bytes)
    }

    pub fn add_mine(&self, file: StoredFile) {
        lock(&self.state.mine).push(file);
    }

    pub fn add_shared(&self, file: SharedFile) {
        lock(&self.state.shared).push(file);
    }

    pub fn put_content(&self, id: FileId, bytes: Bytes) {
        lock(&self.state.contents).insert(id, bytes);
    }

    /// Id returned by the next successful upload.
    pub fn set_next_upload_id(&self, id: FileId) {
        *lock(&self.state.next_upload_id) = Some(id);
    }

    /// Replaces the uploader's event stream with a fixed script.
    pub fn script_upload(&self, events: Vec<TransferEvent<FileId>>) {
        *lock(&self.state.upload_script) = Some(events);
    }

    pub fn set_limits(&self, upload: (u64, u64), download: (u64, u64)) {
        *lock(&self.state.limits) = (upload, download);
    }

    pub fn grantees_of(&self, id: &FileId) -> Vec<RecipientAddress> {
        lock(&self.state.grantees)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Blocks access-handle calls until permits are added to the returned
    /// semaphore.
    pub fn pause_access(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *lock(&self.state.access_gate) = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl StorageProvider for ScriptedStorage {
    async fn list_mine(&self) -> anyhow::Result<Vec<StoredFile>> {
        self.state.record(StorageCall::ListMine)?;
        Ok(lock(&self.state.mine).clone())
    }

    async fn list_shared(&self) -> anyhow::Result<Vec<SharedFile>> {
        self.state.record(StorageCall::ListShared)?;
        Ok(lock(&self.state.shared).clone())
    }

    async fn uploader(&self) -> anyhow::Result<Box<dyn Uploader>> {
        self.state.record(StorageCall::Uploader)?;
        Ok(Box::new(ScriptedHandle {
            state: self.state.clone(),
        }))
    }

    async fn downloader(&self) -> anyhow::Result<Box<dyn Downloader>> {
        self.state.record(StorageCall::Downloader)?;
        Ok(Box::new(ScriptedHandle {
            state: self.state.clone(),
        }))
    }

    async fn access(&self) -> anyhow::Result<Box<dyn AccessHandle>> {
        self.state.record(StorageCall::Access)?;
        Ok(Box::new(ScriptedHandle {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedHandle {
    state: Arc<ScriptedState>,
}

#[async_trait]
impl Uploader for ScriptedHandle {
    async fn upload(&self, source: UploadSource) -> anyhow::Result<TransferEvents<FileId>> {
        self.state.record(StorageCall::Upload {
            name: source.name.clone(),
            size: source.size,
        })?;

        let script = lock(&self.state.upload_script).clone();
        if let Some(script) = script {
            return Ok(Box::pin(futures::stream::iter(script)));
        }

        let total = source.size;
        let chunks: Vec<Result<Bytes, std::io::Error>> = source.body.collect().await;

        let mut events = Vec::with_capacity(chunks.len() + 1);
        let mut transferred = 0u64;
        let mut content = Vec::new();
        for chunk in chunks {
            match chunk {
                Ok(chunk) => {
                    transferred += chunk.len() as u64;
                    content.extend_from_slice(&chunk);
                    events.push(TransferEvent::Progress { transferred, total });
                }
                Err(err) => {
                    events.push(TransferEvent::Failed(format!("reading body failed: {err}")));
                    return Ok(Box::pin(futures::stream::iter(events)));
                }
            }
        }
        *lock(&self.state.uploaded_bytes) += transferred;

        let id = lock(&self.state.next_upload_id)
            .take()
            .unwrap_or_else(|| FileId::new(blake3::hash(&content).to_hex().to_string()));
        lock(&self.state.contents).insert(id.clone(), Bytes::from(content));
        lock(&self.state.mine).push(StoredFile::new(id.clone(), SystemTime::now(), total));
        events.push(TransferEvent::Finished(id));

        Ok(Box::pin(futures::stream::iter(events)))
    }
}

#[async_trait]
impl Downloader for ScriptedHandle {
    async fn download(&self, file: &FileId) -> anyhow::Result<TransferEvents<Bytes>> {
        self.state.record(StorageCall::Download(file.clone()))?;
        let bytes = lock(&self.state.contents)
            .get(file)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file {file}"))?;
        let total = bytes.len() as u64;
        let events = vec![
            TransferEvent::Progress {
                transferred: total / 2,
                total,
            },
            TransferEvent::Progress {
                transferred: total,
                total,
            },
            TransferEvent::Finished(bytes),
        ];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

#[async_trait]
impl AccessHandle for ScriptedHandle {
    async fn grant(&self, file: &FileId, recipient: &RecipientAddress) -> anyhow::Result<()> {
        self.state.pass_gate().await;
        self.state
            .record(StorageCall::Grant(file.clone(), recipient.clone()))?;
        let mut grantees = lock(&self.state.grantees);
        let entry = grantees.entry(file.clone()).or_default();
        if !entry.contains(recipient) {
            entry.push(recipient.clone());
        }
        Ok(())
    }

    async fn revoke(&self, file: &FileId, recipient: &RecipientAddress) -> anyhow::Result<()> {
        self.state.pass_gate().await;
        self.state
            .record(StorageCall::Revoke(file.clone(), recipient.clone()))?;
        if let Some(entry) = lock(&self.state.grantees).get_mut(file) {
            entry.retain(|a| a != recipient);
        }
        Ok(())
    }

    async fn list_grantees(&self, file: &FileId) -> anyhow::Result<Vec<RecipientAddress>> {
        self.state.pass_gate().await;
        self.state.record(StorageCall::ListGrantees(file.clone()))?;
        Ok(lock(&self.state.grantees)
            .get(file)
            .cloned()
            .unwrap_or_default())
    }

    async fn transfer_ownership(
        &self,
        file: &FileId,
        recipient: &RecipientAddress,
    ) -> anyhow::Result<()> {
        self.state.pass_gate().await;
        self.state
            .record(StorageCall::TransferOwnership(file.clone(), recipient.clone()))?;
        lock(&self.state.mine).retain(|f| &f.id != file);
        lock(&self.state.grantees).remove(file);
        Ok(())
    }

    async fn delete(&self, file: &FileId) -> anyhow::Result<()> {
        self.state.pass_gate().await;
        self.state.record(StorageCall::Delete(file.clone()))?;
        lock(&self.state.mine).retain(|f| &f.id != file);
        lock(&self.state.contents).remove(file);
        Ok(())
    }

    async fn upload_limit(&self) -> anyhow::Result<(u64, u64)> {
        self.state.record(StorageCall::UploadLimit)?;
        Ok(lock(&self.state.limits).0)
    }

    async fn download_limit(&self) -> anyhow::Result<(u64, u64)> {
        self.state.record(StorageCall::DownloadLimit)?;
        Ok(lock(&self.state.limits).1)
    }
}

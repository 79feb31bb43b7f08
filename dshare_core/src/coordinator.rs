//! Multi-step file workflows.
//!
//! Every busy workflow has the same three phases:
//!
//! 1. **begin**: set the busy indicator, check local preconditions;
//! 2. **execute**: resolve the recipient (if any), call the access or
//!    transport layer, then update the registry and refresh the quota;
//! 3. **finalize**: emit exactly one success or error notification, then
//!    clear the busy indicator.
//!
//! Workflows run on their own tokio task. A caller that stops polling does
//! not stop the workflow: it runs to completion and still finalizes. The busy
//! indicator is held by a [`BusyGuard`](crate::signal::BusyGuard) inside the
//! task, so it is cleared on panics too.

use bytes::Bytes;
use bytesize::ByteSize;
use futures::{FutureExt, Stream, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::SystemTime;
use tracing::{debug, warn};

use crate::access::AccessController;
use crate::address::RecipientAddress;
use crate::error::{PreconditionError, TransportError, WorkflowError, WorkflowResult};
use crate::file::{FileId, SharedFile, StoredFile};
use crate::identity::{IdentityResolver, RecipientIdentity};
use crate::provider::{
    IdentityProvider, StorageProvider, TransferEvent, TransferEvents, UploadBody, UploadSource,
};
use crate::quota::QuotaSnapshot;
use crate::registry::FileRegistry;
use crate::signal::{BusyUpdater, Signals};

/// Largest file accepted for upload (100 MiB).
pub const MAX_UPLOAD_SIZE: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_upload_size: u64,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_upload_size: MAX_UPLOAD_SIZE,
        }
    }
}

/// What a workflow hands to the finalize phase.
struct Outcome<T> {
    value: T,
    message: Option<String>,
}

impl<T> Outcome<T> {
    fn notify(value: T, message: impl Into<String>) -> WorkflowResult<Self> {
        Ok(Self {
            value,
            message: Some(message.into()),
        })
    }

    fn silent(value: T) -> WorkflowResult<Self> {
        Ok(Self {
            value,
            message: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    resolver: IdentityResolver,
    access: AccessController,
    storage: Arc<dyn StorageProvider>,
    registry: Arc<FileRegistry>,
    signals: Signals,
    limits: TransferLimits,
}

impl TransferCoordinator {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn StorageProvider>,
        registry: Arc<FileRegistry>,
        signals: Signals,
    ) -> Self {
        Self {
            resolver: IdentityResolver::new(identity),
            access: AccessController::new(storage.clone()),
            storage,
            registry,
            signals,
            limits: TransferLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: TransferLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }

    pub fn limits(&self) -> TransferLimits {
        self.limits
    }

    /// Runs `workflow` on its own task between busy-set and busy-clear.
    async fn run<T, F, Fut>(&self, label: &str, workflow: F) -> WorkflowResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Self, BusyUpdater) -> Fut + Send + 'static,
        Fut: Future<Output = WorkflowResult<Outcome<T>>> + Send + 'static,
    {
        let this = self.clone();
        let label = label.to_string();
        let notifier = self.signals.notifier.clone();

        let task = tokio::spawn(async move {
            let busy = this.signals.busy(&label);
            let notifier = this.signals.notifier.clone();
            debug!(workflow = %label, "workflow started");

            let result = AssertUnwindSafe(workflow(this, busy.updater()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(WorkflowError::Aborted(panic_message(&*panic))));
            match &result {
                Ok(outcome) => {
                    if let Some(message) = &outcome.message {
                        notifier.notify_success(message);
                    }
                }
                Err(err) => {
                    warn!(workflow = %label, "workflow failed: {err}");
                    notifier.notify_error(&err.to_string());
                }
            }

            drop(busy);
            result.map(|outcome| outcome.value)
        });

        match task.await {
            Ok(result) => result,
            Err(join_error) => {
                let err = WorkflowError::Aborted(join_error.to_string());
                notifier.notify_error(&err.to_string());
                Err(err)
            }
        }
    }

    /// Reports a failed refresh once; refreshes have no busy phase.
    fn report<T>(&self, result: WorkflowResult<T>) -> WorkflowResult<T> {
        if let Err(err) = &result {
            warn!("refresh failed: {err}");
            self.signals.notifier.notify_error(&err.to_string());
        }
        result
    }

    /// Refreshes the quota after a mutation. A failure here does not fail the
    /// workflow that triggered it; the next refresh reconciles.
    async fn refresh_quota_after_mutation(&self) {
        match self.access.quota().await {
            Ok(quota) => self.registry.snapshot_quota(quota),
            Err(err) => warn!("quota refresh after mutation failed: {err}"),
        }
    }

    pub async fn refresh_mine(&self) -> WorkflowResult<Vec<StoredFile>> {
        let result = self
            .registry
            .refresh_mine(self.storage.as_ref())
            .await
            .map_err(WorkflowError::Refresh);
        self.report(result)
    }

    pub async fn refresh_shared(&self) -> WorkflowResult<Vec<SharedFile>> {
        let result = self
            .registry
            .refresh_shared(self.storage.as_ref())
            .await
            .map_err(WorkflowError::Refresh);
        self.report(result)
    }

    pub async fn refresh_quota(&self) -> WorkflowResult<QuotaSnapshot> {
        let result: WorkflowResult<QuotaSnapshot> = match self.access.quota().await {
            Ok(quota) => {
                self.registry.snapshot_quota(quota);
                Ok(quota)
            }
            Err(err) => Err(err.into()),
        };
        self.report(result)
    }

    /// Uploads `source` and records the new file as owned.
    ///
    /// Sources larger than the configured limit are rejected before the
    /// storage provider is contacted.
    pub async fn upload(&self, source: UploadSource) -> WorkflowResult<StoredFile> {
        self.run("Uploading file", move |this, busy| async move {
            let limit = this.limits.max_upload_size;
            if source.size > limit {
                return Err(PreconditionError::SizeLimitExceeded {
                    size: source.size,
                    limit,
                }
                .into());
            }

            let started = SystemTime::now();
            let declared = source.size;
            let overflow = Arc::new(AtomicU64::new(0));
            let source = UploadSource {
                body: Box::new(BoundedBody::new(source.body, limit, overflow.clone())),
                ..source
            };

            let transfer = async {
                let uploader = this
                    .storage
                    .uploader()
                    .await
                    .map_err(TransportError::Upload)?;
                let events = uploader
                    .upload(source)
                    .await
                    .map_err(TransportError::Upload)?;
                drive(events, |transferred, total| {
                    busy.update(&format!(
                        "Uploaded {} / {}",
                        ByteSize(transferred),
                        ByteSize(total)
                    ));
                })
                .await
            };
            let transferred = transfer.await;

            // the body outgrew its declared size; whatever the transport made
            // of the truncated stream, the upload is rejected
            let size = overflow.load(Ordering::Acquire);
            if size > 0 {
                return Err(PreconditionError::SizeLimitExceeded { size, limit }.into());
            }
            let (id, total) = transferred?;

            let file = StoredFile::new(id, started, total.unwrap_or(declared));
            this.registry.add_mine(file.clone());
            this.refresh_quota_after_mutation().await;
            Outcome::notify(file, "Upload success")
        })
        .await
    }

    /// Downloads a file the user owns or was granted.
    pub async fn download(&self, file: &FileId) -> WorkflowResult<Bytes> {
        let file = file.clone();
        self.run("Downloading file", move |this, busy| async move {
            let downloader = this
                .storage
                .downloader()
                .await
                .map_err(TransportError::Download)?;
            let events = downloader
                .download(&file)
                .await
                .map_err(TransportError::Download)?;

            let (bytes, _) = drive(events, |transferred, total| {
                busy.update(&format!(
                    "Downloaded {} / {}",
                    ByteSize(transferred),
                    ByteSize(total)
                ));
            })
            .await?;

            this.refresh_quota_after_mutation().await;
            Outcome::notify(bytes, "Download success")
        })
        .await
    }

    pub async fn delete_file(&self, file: &FileId) -> WorkflowResult<()> {
        let file = file.clone();
        self.run("Deleting file", move |this, _busy| async move {
            this.access.delete(&file).await?;
            this.registry.remove_mine(&file);
            this.refresh_quota_after_mutation().await;
            Outcome::notify((), "Delete success")
        })
        .await
    }

    /// Grants the account registered for `email` read access to `file`.
    pub async fn share(&self, file: &FileId, email: &str) -> WorkflowResult<RecipientIdentity> {
        let file = file.clone();
        let email = email.trim().to_string();
        self.run("Sharing file", move |this, _busy| async move {
            if email.is_empty() {
                return Err(PreconditionError::EmptyRecipient.into());
            }
            let recipient = this.resolver.resolve_address(&email).await?;
            this.access.grant(&file, &recipient.address).await?;
            let message = format!("Shared file successfully with {email}");
            Outcome::notify(recipient, message)
        })
        .await
    }

    pub async fn revoke(&self, file: &FileId, recipient: &RecipientAddress) -> WorkflowResult<()> {
        let file = file.clone();
        let recipient = recipient.clone();
        self.run("Revoking file access", move |this, _busy| async move {
            this.access.revoke(&file, &recipient).await?;
            Outcome::notify((), "File access revoked")
        })
        .await
    }

    /// Addresses currently granted access to `file`, always fetched fresh.
    pub async fn list_grantees(&self, file: &FileId) -> WorkflowResult<Vec<RecipientAddress>> {
        let file = file.clone();
        self.run("Fetching shared users", move |this, _busy| async move {
            let grantees = this.access.list_grantees(&file).await?;
            Outcome::silent(grantees)
        })
        .await
    }

    /// Hands `file` to the account registered for `email`.
    pub async fn transfer_ownership(
        &self,
        file: &FileId,
        email: &str,
    ) -> WorkflowResult<RecipientIdentity> {
        let file = file.clone();
        let email = email.trim().to_string();
        self.run("Transferring file", move |this, _busy| async move {
            if email.is_empty() {
                return Err(PreconditionError::EmptyRecipient.into());
            }
            let recipient = this.resolver.resolve_address(&email).await?;
            this.access
                .transfer_ownership(&file, &recipient.address)
                .await?;
            this.registry.remove_mine(&file);
            this.refresh_quota_after_mutation().await;
            let message = format!("Transferred file ownership to {email}");
            Outcome::notify(recipient, message)
        })
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "workflow panicked".to_string()
    }
}

/// Upload body that never passes more than `limit` bytes on.
///
/// The chunk that would cross the limit is replaced by an error, its running
/// total is stored in `overflow`, and the stream ends.
struct BoundedBody {
    inner: UploadBody,
    limit: u64,
    seen: u64,
    overflow: Arc<AtomicU64>,
}

impl BoundedBody {
    fn new(inner: UploadBody, limit: u64, overflow: Arc<AtomicU64>) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
            overflow,
        }
    }
}

impl Stream for BoundedBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.seen > self.limit {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.seen = self.seen.saturating_add(chunk.len() as u64);
                if self.seen > self.limit {
                    self.overflow.store(self.seen, Ordering::Release);
                    let limit = self.limit;
                    return Poll::Ready(Some(Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("upload body is larger than {}", ByteSize(limit)),
                    ))));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

/// Consumes a transfer stream up to its terminal event.
///
/// Returns the finished value and the last reported total, if any.
async fn drive<T>(
    mut events: TransferEvents<T>,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<(T, Option<u64>), TransportError> {
    let mut last_total = None;
    while let Some(event) = events.next().await {
        match event {
            TransferEvent::Progress { transferred, total } => {
                last_total = Some(total);
                on_progress(transferred, total);
            }
            TransferEvent::Finished(value) => return Ok((value, last_total)),
            TransferEvent::Failed(message) => return Err(TransportError::Failed(message)),
        }
    }
    Err(TransportError::Incomplete)
}

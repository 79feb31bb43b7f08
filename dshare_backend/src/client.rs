//! Per-user view of a [`Backend`], implementing both provider traits.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dshare_core::keys::AccountKeys;
use dshare_core::{
    AccessHandle, Downloader, FileId, IdentityProvider, LoginMethod, PublicKey, RecipientAddress,
    SessionEvent, SharedFile, StorageProvider, StoredFile, TransferEvent, TransferEvents,
    UploadSource, Uploader, UserProfile,
};
use futures::StreamExt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::backend::{Backend, normalize_identifier};
use crate::error::BackendError;

/// Downloads are read and reported in slices of this size (256 KiB).
pub const DOWNLOAD_SLICE: u64 = 256 * 1024;

const EVENT_BUFFER: usize = 32;

#[derive(Clone)]
struct Account {
    email: String,
    keys: AccountKeys,
}

/// Logged-in client of a shared [`Backend`].
///
/// Only [`LoginMethod::SeedPhrase`] is supported: the account keys are
/// derived from the phrase and the public key is registered for the email on
/// first login.
pub struct Client {
    backend: Arc<Backend>,
    account: RwLock<Option<Account>>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let email = self
            .account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| a.email.clone());
        f.debug_struct("Client")
            .field("email", &email)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(backend: Arc<Backend>) -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            backend,
            account: RwLock::new(None),
            events,
        }
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    fn account(&self) -> Result<Account, BackendError> {
        self.account
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(BackendError::NotLoggedIn)
    }

    fn address(&self) -> Result<RecipientAddress, BackendError> {
        Ok(self.account()?.keys.address())
    }

    fn handle(&self) -> Result<ClientHandle, BackendError> {
        Ok(ClientHandle {
            backend: self.backend.clone(),
            caller: self.address()?,
        })
    }
}

#[async_trait]
impl IdentityProvider for Client {
    async fn is_logged_in(&self) -> anyhow::Result<bool> {
        Ok(self.account().is_ok())
    }

    async fn login(&self, method: LoginMethod) -> anyhow::Result<()> {
        let (email, phrase) = match method {
            LoginMethod::SeedPhrase { email, phrase } => (email, phrase),
            LoginMethod::Social { provider, .. } => {
                return Err(BackendError::UnsupportedLogin(provider).into());
            }
            _ => return Err(BackendError::UnsupportedLogin("unknown".into()).into()),
        };
        let keys = AccountKeys::from_seed_phrase(&phrase)?;
        let email = normalize_identifier(&email);
        self.backend
            .register_identity(&email, keys.public_key())
            .await?;
        debug!(%email, address = %keys.address(), "logged in");
        *self.account.write().unwrap_or_else(PoisonError::into_inner) =
            Some(Account { email, keys });
        Ok(())
    }

    async fn logout(&self) -> anyhow::Result<()> {
        self.account
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // nobody listening is fine
        let _ = self.events.send(SessionEvent::Disconnect);
        Ok(())
    }

    async fn current_user(&self) -> anyhow::Result<UserProfile> {
        let account = self.account()?;
        Ok(UserProfile {
            email: account.email,
            name: None,
            public_key: account.keys.public_key(),
        })
    }

    async fn lookup_public_key(&self, identifier: &str) -> anyhow::Result<Option<PublicKey>> {
        self.backend.lookup_identity(identifier).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl StorageProvider for Client {
    async fn list_mine(&self) -> anyhow::Result<Vec<StoredFile>> {
        let address = self.address()?;
        let files = self.backend.files_owned_by(&address).await?;
        Ok(files.iter().map(|f| f.to_stored()).collect())
    }

    async fn list_shared(&self) -> anyhow::Result<Vec<SharedFile>> {
        let address = self.address()?;
        let files = self.backend.files_shared_with(&address).await?;
        Ok(files
            .into_iter()
            .map(|f| SharedFile {
                file: f.to_stored(),
                owner: f.owner,
            })
            .collect())
    }

    async fn uploader(&self) -> anyhow::Result<Box<dyn Uploader>> {
        Ok(Box::new(self.handle()?))
    }

    async fn downloader(&self) -> anyhow::Result<Box<dyn Downloader>> {
        Ok(Box::new(self.handle()?))
    }

    async fn access(&self) -> anyhow::Result<Box<dyn AccessHandle>> {
        Ok(Box::new(self.handle()?))
    }
}

/// Capability bound to the account that was logged in when it was created.
struct ClientHandle {
    backend: Arc<Backend>,
    caller: RecipientAddress,
}

#[async_trait]
impl Uploader for ClientHandle {
    async fn upload(&self, source: UploadSource) -> anyhow::Result<TransferEvents<FileId>> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let backend = self.backend.clone();
        let owner = self.caller.clone();
        let UploadSource {
            name,
            size: total,
            mut body,
        } = source;

        tokio::spawn(async move {
            let mut content = BytesMut::with_capacity(usize::try_from(total).unwrap_or(0));
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => {
                        let transferred = (content.len() + chunk.len()) as u64;
                        if transferred > total {
                            let err = BackendError::BodyExceedsDeclaredSize { declared: total };
                            warn!(%name, "upload rejected: {err}");
                            let _ = tx.send(TransferEvent::Failed(err.to_string())).await;
                            return;
                        }
                        content.extend_from_slice(&chunk);
                        let progress = TransferEvent::Progress { transferred, total };
                        if tx.send(progress).await.is_err() {
                            debug!(%name, "upload receiver dropped");
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx
                            .send(TransferEvent::Failed(format!("reading {name} failed: {err}")))
                            .await;
                        return;
                    }
                }
            }

            let terminal = match backend.store(&owner, content.freeze()).await {
                Ok(record) => TransferEvent::Finished(record.id),
                Err(err) => {
                    warn!(%name, "upload rejected: {err}");
                    TransferEvent::Failed(err.to_string())
                }
            };
            let _ = tx.send(terminal).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl Downloader for ClientHandle {
    async fn download(&self, file: &FileId) -> anyhow::Result<TransferEvents<Bytes>> {
        let record = self.backend.begin_download(&self.caller, file).await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let backend = self.backend.clone();

        tokio::spawn(async move {
            let total = record.size;
            let mut content = BytesMut::with_capacity(usize::try_from(total).unwrap_or(0));
            while (content.len() as u64) < total {
                let offset = content.len() as u64;
                let slice = match backend.read_slice(&record.id, offset, DOWNLOAD_SLICE).await {
                    Ok(slice) if !slice.is_empty() => slice,
                    Ok(_) => {
                        let _ = tx
                            .send(TransferEvent::Failed(format!(
                                "{} is truncated at {offset} of {total} bytes",
                                record.id
                            )))
                            .await;
                        return;
                    }
                    Err(err) => {
                        let _ = tx.send(TransferEvent::Failed(err.to_string())).await;
                        return;
                    }
                };
                content.extend_from_slice(&slice);
                let progress = TransferEvent::Progress {
                    transferred: content.len() as u64,
                    total,
                };
                if tx.send(progress).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(TransferEvent::Finished(content.freeze())).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl AccessHandle for ClientHandle {
    async fn grant(&self, file: &FileId, recipient: &RecipientAddress) -> anyhow::Result<()> {
        self.backend.grant(&self.caller, file, recipient).await
    }

    async fn revoke(&self, file: &FileId, recipient: &RecipientAddress) -> anyhow::Result<()> {
        self.backend.revoke(&self.caller, file, recipient).await
    }

    async fn list_grantees(&self, file: &FileId) -> anyhow::Result<Vec<RecipientAddress>> {
        self.backend.list_grantees(&self.caller, file).await
    }

    async fn transfer_ownership(
        &self,
        file: &FileId,
        recipient: &RecipientAddress,
    ) -> anyhow::Result<()> {
        self.backend.transfer(&self.caller, file, recipient).await
    }

    async fn delete(&self, file: &FileId) -> anyhow::Result<()> {
        self.backend.delete(&self.caller, file).await
    }

    async fn upload_limit(&self) -> anyhow::Result<(u64, u64)> {
        let used = self.backend.storage_used(&self.caller).await?;
        Ok((used, self.backend.limits().total_storage))
    }

    async fn download_limit(&self) -> anyhow::Result<(u64, u64)> {
        let used = self.backend.bandwidth_used(&self.caller).await?;
        Ok((used, self.backend.limits().total_bandwidth))
    }
}

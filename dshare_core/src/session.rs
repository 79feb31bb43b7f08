//! Login state around the identity provider.
//!
//! [`Session`] owns the cached [`UserProfile`] and reacts to the provider's
//! [`SessionEvent::Disconnect`] by clearing every piece of local state (the
//! profile and the whole [`FileRegistry`]) and telling the user to log in
//! again.

use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{WorkflowError, WorkflowResult};
use crate::provider::{IdentityProvider, LoginMethod, SessionEvent, UserProfile};
use crate::registry::FileRegistry;
use crate::signal::Signals;

/// Message shown after the provider dropped the session.
pub const DISCONNECTED_MESSAGE: &str = "Session disconnected, please log in again";

#[derive(Debug)]
pub struct Session {
    identity: Arc<dyn IdentityProvider>,
    registry: Arc<FileRegistry>,
    signals: Signals,
    profile: RwLock<Option<UserProfile>>,
}

impl Session {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        registry: Arc<FileRegistry>,
        signals: Signals,
    ) -> Arc<Self> {
        Arc::new(Self {
            identity,
            registry,
            signals,
            profile: RwLock::new(None),
        })
    }

    /// Starts watching for provider disconnects.
    ///
    /// The watcher ends when the provider drops its event channel.
    pub fn init(self: &Arc<Self>) -> JoinHandle<()> {
        let _busy = self.signals.busy("Initialising auth...");
        let mut events = self.identity.subscribe();
        let session = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Disconnect) => {
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        session.handle_disconnect();
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session watcher lagged behind provider events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("session watcher stopped");
        })
    }

    fn handle_disconnect(&self) {
        info!("identity provider disconnected, clearing local state");
        self.clear_profile();
        self.registry.clear();
        self.signals.notifier.notify_error(DISCONNECTED_MESSAGE);
    }

    fn clear_profile(&self) {
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub async fn is_logged_in(&self) -> WorkflowResult<bool> {
        let _busy = self.signals.busy("Checking login status...");
        self.identity
            .is_logged_in()
            .await
            .map_err(|e| self.fail(e))
    }

    pub async fn login(&self, method: LoginMethod) -> WorkflowResult<()> {
        debug!(?method, "logging in");
        self.identity.login(method).await.map_err(|e| self.fail(e))
    }

    /// Fetches the current user's profile and caches it.
    pub async fn fetch_user_details(&self) -> WorkflowResult<UserProfile> {
        let _busy = self.signals.busy("Fetching account details...");
        let profile = self
            .identity
            .current_user()
            .await
            .map_err(|e| self.fail(e))?;
        debug!(email = %profile.email, address = %profile.address(), "fetched account details");
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = Some(profile.clone());
        Ok(profile)
    }

    /// Logs out at the provider. Local state is cleared by the disconnect
    /// watcher once the provider reports the session as gone.
    pub async fn logout(&self) -> WorkflowResult<()> {
        self.identity.logout().await.map_err(|e| self.fail(e))
    }

    /// Profile from the last successful [`Session::fetch_user_details`].
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fail(&self, err: anyhow::Error) -> WorkflowError {
        let err = WorkflowError::Session(err);
        self.signals.notifier.notify_error(&err.to_string());
        err
    }
}

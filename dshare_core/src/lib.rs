//! Core types and workflows for capability-based file sharing.
//!
//! This crate defines how a client shares files through an external identity
//! provider and an external storage provider, without knowing how either is
//! implemented.
//!
//! ## Components
//!
//! - [`IdentityResolver`]: human identifier (email) to recipient address.
//! - [`AccessController`]: grant, revoke, list, transfer and delete, one
//!   fresh access handle per call.
//! - [`FileRegistry`]: local "mine" / "shared with me" sets and the last
//!   quota snapshot.
//! - [`TransferCoordinator`]: the user-facing workflows, each with exactly
//!   one terminal notification and a busy indicator that is always cleared.
//! - [`Session`]: login state, cleared when the provider disconnects.
//!
//! ## Collaborators
//!
//! Providers implement the traits in [`provider`]; user-facing surfaces
//! implement [`Notifier`] and [`ProgressSurface`]. A reference provider lives
//! in `dshare_backend`.

pub mod access;
pub mod address;
pub mod coordinator;
pub mod error;
pub mod file;
pub mod identity;
pub mod keys;
pub mod provider;
pub mod quota;
pub mod registry;
pub mod session;
pub mod signal;

// Test utilities (behind feature flag)
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use access::AccessController;
pub use address::{PublicKey, RecipientAddress};
pub use coordinator::{MAX_UPLOAD_SIZE, TransferCoordinator, TransferLimits};
pub use error::{
    AccessError, AccessOp, LookupError, PreconditionError, TransportError, WorkflowError,
    WorkflowResult,
};
pub use file::{FileId, SharedFile, StoredFile};
pub use identity::{IdentityResolver, RecipientIdentity};
pub use keys::AccountKeys;
pub use provider::{
    AccessHandle, Downloader, IdentityProvider, LoginMethod, SessionEvent, StorageProvider,
    TransferEvent, TransferEvents, UploadBody, UploadSource, Uploader, UserProfile,
};
pub use quota::QuotaSnapshot;
pub use registry::FileRegistry;
pub use session::Session;
pub use signal::{BusyGuard, LogSignals, Notifier, ProgressSurface, Signals};

//! Error taxonomy for dshare workflows.
//!
//! Providers report failures as [`anyhow::Error`]; the core wraps them into
//! the typed errors below so callers can tell a rejected precondition from a
//! failed lookup, access call or transfer.

use bytesize::ByteSize;
use std::fmt;
use thiserror::Error;

use crate::file::FileId;

/// Result type returned by every coordinator workflow.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Rejected locally, before any remote call was made.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error(
        "You are not allowed to upload files bigger than {}. ({} requested)",
        human(.limit),
        human(.size)
    )]
    SizeLimitExceeded { size: u64, limit: u64 },
    #[error("a recipient identifier is required")]
    EmptyRecipient,
    #[error("invalid recipient address: {0:?}")]
    InvalidAddress(String),
}

/// Identity resolution failures.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no identity registered for {0}")]
    NotFound(String),
    #[error("public key lookup for {identifier} failed: {source}")]
    Failure {
        identifier: String,
        #[source]
        source: anyhow::Error,
    },
}

fn human(bytes: &u64) -> ByteSize {
    ByteSize(*bytes)
}

fn for_file(file: &Option<FileId>) -> String {
    file.as_ref().map(|f| format!(" for {f}")).unwrap_or_default()
}

/// Remote access-control operation, used to label [`AccessError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    OpenHandle,
    Grant,
    Revoke,
    ListGrantees,
    TransferOwnership,
    Delete,
    Quota,
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessOp::OpenHandle => "open access handle",
            AccessOp::Grant => "grant access",
            AccessOp::Revoke => "revoke access",
            AccessOp::ListGrantees => "list shared users",
            AccessOp::TransferOwnership => "transfer ownership",
            AccessOp::Delete => "delete file",
            AccessOp::Quota => "fetch storage limits",
        };
        f.write_str(name)
    }
}

/// An access-control call was rejected by, or failed to reach, the backend.
#[derive(Debug, Error)]
#[error("{op}{} failed: {source}", for_file(.file))]
pub struct AccessError {
    pub op: AccessOp,
    pub file: Option<FileId>,
    #[source]
    pub source: anyhow::Error,
}

impl AccessError {
    pub fn new(op: AccessOp, file: Option<&FileId>, source: anyhow::Error) -> Self {
        Self {
            op,
            file: file.cloned(),
            source,
        }
    }
}

/// Upload or download failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("upload failed: {0}")]
    Upload(#[source] anyhow::Error),
    #[error("download failed: {0}")]
    Download(#[source] anyhow::Error),
    /// The transport reported a terminal failure event.
    #[error("{0}")]
    Failed(String),
    #[error("transfer ended without a terminal event")]
    Incomplete,
}

/// Union of everything a workflow can fail with.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Listing files from the backing store failed.
    #[error("refresh failed: {0}")]
    Refresh(#[source] anyhow::Error),
    /// Session-level provider call (login, logout, profile) failed.
    #[error("{0}")]
    Session(#[source] anyhow::Error),
    /// The workflow task panicked or was torn down before finishing.
    #[error("workflow aborted: {0}")]
    Aborted(String),
}

impl WorkflowError {
    pub fn is_precondition(&self) -> bool {
        matches!(self, WorkflowError::Precondition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_error_names_operation_and_file() {
        let err = AccessError::new(
            AccessOp::Delete,
            Some(&FileId::new("xyz")),
            anyhow::anyhow!("not the owner"),
        );
        assert_eq!(err.to_string(), "delete file for xyz failed: not the owner");

        let err = AccessError::new(AccessOp::Quota, None, anyhow::anyhow!("offline"));
        assert_eq!(err.to_string(), "fetch storage limits failed: offline");
    }

    #[test]
    fn size_limit_message_mentions_limit() {
        let err = PreconditionError::SizeLimitExceeded {
            size: 200 * 1024 * 1024,
            limit: 100 * 1024 * 1024,
        };
        assert!(err.to_string().starts_with("You are not allowed to upload files bigger than"));
    }
}

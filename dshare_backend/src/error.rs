use bytesize::ByteSize;
use dshare_core::{FileId, RecipientAddress};
use thiserror::Error;

/// Rules enforced by the reference backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("{0} logins are not supported by the local backend")]
    UnsupportedLogin(String),
    #[error("{email} is already registered with a different key")]
    IdentityConflict { email: String },
    #[error("upload body is larger than its declared {}", human(.declared))]
    BodyExceedsDeclaredSize { declared: u64 },
    #[error("file {0} does not exist")]
    UnknownFile(FileId),
    #[error("file {0} already exists")]
    Duplicate(FileId),
    #[error("{caller} is not the owner of {file}")]
    NotOwner {
        file: FileId,
        caller: RecipientAddress,
    },
    #[error("{caller} has no access to {file}")]
    NoAccess {
        file: FileId,
        caller: RecipientAddress,
    },
    #[error("storage quota exceeded: {} needed, {} available", human(.needed), human(.available))]
    StorageQuotaExceeded { needed: u64, available: u64 },
    #[error("bandwidth quota exceeded: {} needed, {} available", human(.needed), human(.available))]
    BandwidthQuotaExceeded { needed: u64, available: u64 },
}

fn human(bytes: &u64) -> ByteSize {
    ByteSize(*bytes)
}

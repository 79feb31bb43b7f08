use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::address::RecipientAddress;

/// Opaque content identifier ("did") assigned by the storage backend.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(did: impl Into<String>) -> Self {
        Self(did.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FileId").field(&self.0).finish()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A file owned by the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub created_at: SystemTime,
    pub size: u64,
}

impl StoredFile {
    pub fn new(id: FileId, created_at: SystemTime, size: u64) -> Self {
        Self {
            id,
            created_at,
            size,
        }
    }
}

/// A file another identity owns and has granted the current user access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    pub file: StoredFile,
    pub owner: RecipientAddress,
}

impl SharedFile {
    pub fn id(&self) -> &FileId {
        &self.file.id
    }
}

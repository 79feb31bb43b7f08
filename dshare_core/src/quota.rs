use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last known storage and bandwidth usage for the current account.
///
/// Only valid until the next mutating operation; the coordinator refreshes it
/// after every upload, delete, ownership transfer and download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub storage_used: u64,
    pub total_storage: u64,
    pub bandwidth_used: u64,
    pub total_bandwidth: u64,
}

impl QuotaSnapshot {
    /// Assembles a snapshot from the `(used, total)` pairs providers report.
    pub fn from_limits(upload: (u64, u64), download: (u64, u64)) -> Self {
        Self {
            storage_used: upload.0,
            total_storage: upload.1,
            bandwidth_used: download.0,
            total_bandwidth: download.1,
        }
    }

    pub fn storage_remaining(&self) -> u64 {
        self.total_storage.saturating_sub(self.storage_used)
    }

    pub fn bandwidth_remaining(&self) -> u64 {
        self.total_bandwidth.saturating_sub(self.bandwidth_used)
    }
}

impl fmt::Display for QuotaSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "storage {} / {}, bandwidth {} / {}",
            ByteSize(self.storage_used),
            ByteSize(self.total_storage),
            ByteSize(self.bandwidth_used),
            ByteSize(self.total_bandwidth)
        )
    }
}

//! Access control over stored files.
//!
//! [`AccessController`] is a thin typed layer over [`AccessHandle`]. Every
//! operation acquires a fresh handle from the storage provider, makes exactly
//! one remote call on it and drops it. Nothing about grant state is cached
//! locally; `list_grantees` always asks the backend.

use std::sync::Arc;
use tracing::debug;

use crate::address::RecipientAddress;
use crate::error::{AccessError, AccessOp};
use crate::file::FileId;
use crate::provider::{AccessHandle, StorageProvider};
use crate::quota::QuotaSnapshot;

#[derive(Debug, Clone)]
pub struct AccessController {
    storage: Arc<dyn StorageProvider>,
}

impl AccessController {
    pub fn new(storage: Arc<dyn StorageProvider>) -> Self {
        Self { storage }
    }

    /// Capability handle scoped to a single operation.
    async fn handle(
        &self,
        op: AccessOp,
        file: Option<&FileId>,
    ) -> Result<Box<dyn AccessHandle>, AccessError> {
        self.storage.access().await.map_err(|source| {
            AccessError::new(
                AccessOp::OpenHandle,
                file,
                source.context(format!("while preparing to {op}")),
            )
        })
    }

    pub async fn grant(
        &self,
        file: &FileId,
        recipient: &RecipientAddress,
    ) -> Result<(), AccessError> {
        let handle = self.handle(AccessOp::Grant, Some(file)).await?;
        handle
            .grant(file, recipient)
            .await
            .map_err(|e| AccessError::new(AccessOp::Grant, Some(file), e))?;
        debug!(%file, %recipient, "access granted");
        Ok(())
    }

    pub async fn revoke(
        &self,
        file: &FileId,
        recipient: &RecipientAddress,
    ) -> Result<(), AccessError> {
        let handle = self.handle(AccessOp::Revoke, Some(file)).await?;
        handle
            .revoke(file, recipient)
            .await
            .map_err(|e| AccessError::new(AccessOp::Revoke, Some(file), e))?;
        debug!(%file, %recipient, "access revoked");
        Ok(())
    }

    pub async fn list_grantees(&self, file: &FileId) -> Result<Vec<RecipientAddress>, AccessError> {
        let handle = self.handle(AccessOp::ListGrantees, Some(file)).await?;
        handle
            .list_grantees(file)
            .await
            .map_err(|e| AccessError::new(AccessOp::ListGrantees, Some(file), e))
    }

    /// Hands `file` over to `recipient`. Irrevocable once acknowledged.
    pub async fn transfer_ownership(
        &self,
        file: &FileId,
        recipient: &RecipientAddress,
    ) -> Result<(), AccessError> {
        let handle = self.handle(AccessOp::TransferOwnership, Some(file)).await?;
        handle
            .transfer_ownership(file, recipient)
            .await
            .map_err(|e| AccessError::new(AccessOp::TransferOwnership, Some(file), e))?;
        debug!(%file, %recipient, "ownership transferred");
        Ok(())
    }

    /// Deletes `file` from the backing store. Irrevocable once acknowledged.
    pub async fn delete(&self, file: &FileId) -> Result<(), AccessError> {
        let handle = self.handle(AccessOp::Delete, Some(file)).await?;
        handle
            .delete(file)
            .await
            .map_err(|e| AccessError::new(AccessOp::Delete, Some(file), e))?;
        debug!(%file, "file deleted");
        Ok(())
    }

    /// Current storage and bandwidth usage, read through one handle.
    pub async fn quota(&self) -> Result<QuotaSnapshot, AccessError> {
        let handle = self.handle(AccessOp::Quota, None).await?;
        let upload = handle
            .upload_limit()
            .await
            .map_err(|e| AccessError::new(AccessOp::Quota, None, e))?;
        let download = handle
            .download_limit()
            .await
            .map_err(|e| AccessError::new(AccessOp::Quota, None, e))?;
        Ok(QuotaSnapshot::from_limits(upload, download))
    }
}

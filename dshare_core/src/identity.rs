use std::sync::Arc;
use tracing::debug;

use crate::address::{PublicKey, RecipientAddress};
use crate::error::LookupError;
use crate::provider::IdentityProvider;

/// A recipient resolved for the duration of one workflow.
///
/// Deliberately not cached: every workflow resolves the identifier again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientIdentity {
    pub human_identifier: String,
    pub public_key: PublicKey,
    pub address: RecipientAddress,
}

/// Maps human-readable identifiers (emails) to recipient addresses.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
}

impl IdentityResolver {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Looks up the public key for `human_identifier` and derives its address.
    ///
    /// Makes exactly one provider call and never retries.
    pub async fn resolve_address(
        &self,
        human_identifier: &str,
    ) -> Result<RecipientIdentity, LookupError> {
        let public_key = self
            .provider
            .lookup_public_key(human_identifier)
            .await
            .map_err(|source| LookupError::Failure {
                identifier: human_identifier.to_string(),
                source,
            })?
            .ok_or_else(|| LookupError::NotFound(human_identifier.to_string()))?;

        let address = public_key.address();
        debug!(identifier = human_identifier, %address, "resolved recipient");

        Ok(RecipientIdentity {
            human_identifier: human_identifier.to_string(),
            public_key,
            address,
        })
    }
}

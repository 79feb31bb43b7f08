//! BIP39 seed phrase handling and account key derivation.
//!
//! ## Key Derivation Chain
//!
//! ```text
//! seed_phrase (12 words BIP39)
//!     |
//!     v
//! mnemonic.to_seed("") -> 64 bytes
//!     |
//!     v
//! blake3::derive_key("dshare/root", seed) -> root_secret [32 bytes]
//!     |
//!     +-- blake3::derive_key("dshare/account/ed25519", root_secret) -> signing_key
//!             |
//!             +-> public_key -> recipient address
//! ```

use bip39::{Language, Mnemonic};
use blake3::derive_key;
use ed25519_dalek::SigningKey;
use thiserror::Error;

use crate::address::{PublicKey, RecipientAddress};

/// Errors that can occur during key operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("Invalid root secret: must be 32 bytes")]
    InvalidRootSecret,
}

/// Account key material derived from a seed phrase or root secret.
#[derive(Clone)]
pub struct AccountKeys {
    /// Root secret (first level derivation from seed)
    pub root_secret: [u8; 32],
    /// Ed25519 signing key bytes
    pub signing_key_bytes: [u8; 32],
    /// Ed25519 public key (account identity)
    pub public_key: [u8; 32],
}

impl AccountKeys {
    /// Derive account keys from a 12-word BIP39 mnemonic.
    pub fn from_seed_phrase(phrase: &str) -> Result<Self, KeyError> {
        let mnemonic = Mnemonic::parse_in(Language::English, phrase.trim())
            .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
        let seed = mnemonic.to_seed("");
        Ok(Self::from_seed_bytes(&seed))
    }

    /// Derive account keys from raw seed bytes (64 bytes from `mnemonic.to_seed("")`).
    pub fn from_seed_bytes(seed: &[u8]) -> Self {
        let root_secret = derive_key("dshare/root", seed);
        Self::from_root_secret_array(&root_secret)
    }

    /// Derive keys from an existing root secret (32 bytes).
    pub fn from_root_secret(root_secret: &[u8]) -> Result<Self, KeyError> {
        let arr: [u8; 32] = root_secret
            .try_into()
            .map_err(|_| KeyError::InvalidRootSecret)?;
        Ok(Self::from_root_secret_array(&arr))
    }

    fn from_root_secret_array(root_secret: &[u8; 32]) -> Self {
        let signing_key_bytes = derive_key("dshare/account/ed25519", root_secret);
        let signing_key = SigningKey::from_bytes(&signing_key_bytes);
        let public_key = *signing_key.verifying_key().as_bytes();

        AccountKeys {
            root_secret: *root_secret,
            signing_key_bytes,
            public_key,
        }
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signing_key_bytes)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.public_key)
    }

    /// The address other users grant access to.
    pub fn address(&self) -> RecipientAddress {
        self.public_key().address()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }
}

/// Generate a new random 12-word BIP39 seed phrase.
pub fn generate_seed_phrase() -> Result<String, KeyError> {
    let mnemonic = Mnemonic::generate_in(Language::English, 12)
        .map_err(|e| KeyError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Validate a BIP39 seed phrase.
pub fn validate_seed_phrase(phrase: &str) -> bool {
    Mnemonic::parse_in(Language::English, phrase.trim()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_and_validate() {
        let phrase = generate_seed_phrase().unwrap();
        assert!(validate_seed_phrase(&phrase));
        assert_eq!(phrase.split_whitespace().count(), 12);
    }

    #[test]
    fn test_derivation_deterministic() {
        let keys1 = AccountKeys::from_seed_phrase(TEST_PHRASE).unwrap();
        let keys2 = AccountKeys::from_seed_phrase(TEST_PHRASE).unwrap();

        assert_eq!(keys1.root_secret, keys2.root_secret);
        assert_eq!(keys1.public_key, keys2.public_key);
        assert_eq!(keys1.address(), keys2.address());
    }

    #[test]
    fn test_from_root_secret_matches() {
        let from_phrase = AccountKeys::from_seed_phrase(TEST_PHRASE).unwrap();
        let from_root = AccountKeys::from_root_secret(&from_phrase.root_secret).unwrap();

        assert_eq!(from_phrase.signing_key_bytes, from_root.signing_key_bytes);
        assert_eq!(from_phrase.public_key, from_root.public_key);
    }

    #[test]
    fn test_invalid_input() {
        assert!(AccountKeys::from_seed_phrase("invalid phrase").is_err());
        assert!(!validate_seed_phrase("invalid phrase"));
        assert!(AccountKeys::from_root_secret(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_public_key_matches_signing_key() {
        let keys = AccountKeys::from_seed_phrase(TEST_PHRASE).unwrap();
        assert_eq!(
            keys.signing_key().verifying_key().as_bytes(),
            &keys.public_key
        );
        assert_eq!(keys.public_key_hex().len(), 64);
    }
}

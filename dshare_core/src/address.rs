//! Recipient addresses and the public keys they are derived from.
//!
//! A [`RecipientAddress`] is the unit of access control: grants, revocations
//! and ownership transfers all name an address, never an email. Addresses are
//! a pure function of the account's public key:
//!
//! ```text
//! address = "0x" || hex( derive_key("dshare/recipient-address", public_key)[12..32] )
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PreconditionError;

const ADDRESS_CONTEXT: &str = "dshare/recipient-address";

/// Number of raw bytes in an address (40 hex characters).
pub const ADDRESS_LEN: usize = 20;

/// Public key bytes as returned by an identity provider.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Derives the canonical recipient address for this key.
    pub fn address(&self) -> RecipientAddress {
        RecipientAddress::from_public_key(self)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.to_hex()).finish()
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(value: [u8; 32]) -> Self {
        Self(value.to_vec())
    }
}

/// Stable identifier derived from a public key.
///
/// Always stored in its normalised form: `0x` followed by 40 lowercase hex
/// characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecipientAddress(String);

impl RecipientAddress {
    /// Derives the address for `public_key`.
    ///
    /// Deterministic: the same key always yields the same address.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = blake3::derive_key(ADDRESS_CONTEXT, public_key.as_bytes());
        let tail = &digest[digest.len() - ADDRESS_LEN..];
        Self(format!("0x{}", hex::encode(tail)))
    }

    /// Parses a user-supplied address, accepting upper- or lowercase hex.
    pub fn parse(s: &str) -> Result<Self, PreconditionError> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| PreconditionError::InvalidAddress(s.to_string()))?;

        if digits.len() != ADDRESS_LEN * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PreconditionError::InvalidAddress(s.to_string()));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RecipientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecipientAddress").field(&self.0).finish()
    }
}

impl fmt::Display for RecipientAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecipientAddress {
    type Err = PreconditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecipientAddress {
    type Error = PreconditionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecipientAddress> for String {
    fn from(value: RecipientAddress) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let key = PublicKey::from([7u8; 32]);
        let a = RecipientAddress::from_public_key(&key);
        let b = key.address();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 42);
        assert!(a.as_str().starts_with("0x"));
    }

    #[test]
    fn different_keys_give_different_addresses() {
        let a = PublicKey::from([1u8; 32]).address();
        let b = PublicKey::from([2u8; 32]).address();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_normalises_case() {
        let derived = PublicKey::from([9u8; 32]).address();
        let upper = format!("0X{}", derived.as_str()[2..].to_ascii_uppercase());
        assert_eq!(RecipientAddress::parse(&upper).unwrap(), derived);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(RecipientAddress::parse("0xBEEF").is_err());
        assert!(RecipientAddress::parse("not an address").is_err());
        assert!(RecipientAddress::parse(&format!("0x{}", "g".repeat(40))).is_err());
        assert!(RecipientAddress::parse(&"a".repeat(42)).is_err());
    }
}

//! Identifiers used throughout clearbatch.
//!
//! Accounts are raw 32-byte public keys. Pool IDs and offer hashes are
//! SHA-256 digests over domain-separated canonical encodings, so every node
//! derives identical values from identical inputs.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants;
use crate::Asset;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A ledger account, identified by its 32-byte public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    #[must_use]
    pub fn from_pubkey(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", hex::encode(&self.0[..8]))
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl AccountId {
    /// Deterministic fixture account: every byte is `tag`.
    #[must_use]
    pub fn test_account(tag: u8) -> Self {
        Self([tag; 32])
    }
}

// ---------------------------------------------------------------------------
// PoolId
// ---------------------------------------------------------------------------

/// Identifier of a constant-product pool, derived from its asset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PoolId(pub [u8; 32]);

impl PoolId {
    /// Derive the pool ID for two assets. Argument order does not matter.
    #[must_use]
    pub fn for_assets(a: &Asset, b: &Asset) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = Sha256::new();
        hasher.update(constants::POOL_ID_DOMAIN);
        low.hash_into(&mut hasher);
        high.hash_into(&mut hasher);
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// OfferHash
// ---------------------------------------------------------------------------

/// Tie-break hash that makes the offer order total and node-independent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OfferHash(pub [u8; 32]);

impl OfferHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OfferHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

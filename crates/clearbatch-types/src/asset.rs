//! Assets and ordered asset pairs.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{constants, AccountId, ClearbatchError, Result};

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A tradeable asset: the native ledger asset, or a code issued by an account.
///
/// The derived order (native first, then by code, then by issuer) is the
/// canonical order used for price vectors, pool reserves and iteration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Asset {
    Native,
    Issued { code: String, issuer: AccountId },
}

impl Asset {
    /// Build an issued asset, validating the code.
    pub fn issued(code: impl Into<String>, issuer: AccountId) -> Result<Self> {
        let code = code.into();
        if code.is_empty()
            || code.len() > constants::MAX_ASSET_CODE_LEN
            || !code.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(ClearbatchError::Configuration(format!(
                "invalid asset code {code:?}"
            )));
        }
        Ok(Self::Issued { code, issuer })
    }

    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// The issuing account, if any.
    #[must_use]
    pub fn issuer(&self) -> Option<&AccountId> {
        match self {
            Self::Native => None,
            Self::Issued { issuer, .. } => Some(issuer),
        }
    }

    /// Feed a canonical, length-prefixed encoding into a hasher.
    pub fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            Self::Native => hasher.update([0u8]),
            Self::Issued { code, issuer } => {
                hasher.update([1u8]);
                hasher.update((code.len() as u64).to_le_bytes());
                hasher.update(code.as_bytes());
                hasher.update(issuer.as_bytes());
            }
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Issued { code, issuer } => write!(f, "{code}:{}", issuer.short()),
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Asset {
    /// Issued asset with a fixed fixture issuer.
    #[must_use]
    pub fn test_issued(code: &str) -> Self {
        Self::Issued {
            code: code.to_string(),
            issuer: AccountId::test_account(0xee),
        }
    }

    /// `n` distinct issued assets `A0..A{n-1}`, in canonical order.
    #[must_use]
    pub fn test_assets(n: usize) -> Vec<Self> {
        let mut assets: Vec<Self> = (0..n).map(|i| Self::test_issued(&format!("A{i}"))).collect();
        assets.sort();
        assets
    }
}

// ---------------------------------------------------------------------------
// AssetPair
// ---------------------------------------------------------------------------

/// An ordered trading direction: offers in this pair sell `selling` for `buying`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetPair {
    pub selling: Asset,
    pub buying: Asset,
}

impl AssetPair {
    pub fn new(selling: Asset, buying: Asset) -> Result<Self> {
        if selling == buying {
            return Err(ClearbatchError::Configuration(format!(
                "asset pair sells and buys {selling}"
            )));
        }
        Ok(Self { selling, buying })
    }

    /// Construct without the distinctness check; for callers that already
    /// iterate distinct assets.
    #[must_use]
    pub fn new_unchecked(selling: Asset, buying: Asset) -> Self {
        debug_assert_ne!(selling, buying);
        Self { selling, buying }
    }

    #[must_use]
    pub fn reverse(&self) -> Self {
        Self {
            selling: self.buying.clone(),
            buying: self.selling.clone(),
        }
    }

    /// The two assets in canonical (ascending) order.
    #[must_use]
    pub fn canonical_assets(&self) -> (&Asset, &Asset) {
        if self.selling < self.buying {
            (&self.selling, &self.buying)
        } else {
            (&self.buying, &self.selling)
        }
    }

    /// Whether `selling` is the canonically lower asset ("asset A" of a pool).
    #[must_use]
    pub fn sells_lower_asset(&self) -> bool {
        self.selling < self.buying
    }

    /// Every ordered pair over a set of distinct assets, in canonical order.
    #[must_use]
    pub fn all_pairs(assets: &[Asset]) -> Vec<Self> {
        let mut pairs = Vec::with_capacity(assets.len() * assets.len().saturating_sub(1));
        for selling in assets {
            for buying in assets {
                if selling != buying {
                    pairs.push(Self::new_unchecked(selling.clone(), buying.clone()));
                }
            }
        }
        pairs.sort();
        pairs
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.selling, self.buying)
    }
}

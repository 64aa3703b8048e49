//! Offer limit prices and the per-asset clearing price vector.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{constants, Asset, ClearbatchError, Result};

// ---------------------------------------------------------------------------
// Price
// ---------------------------------------------------------------------------

/// A positive rational limit price `n / d`: units of the buying asset
/// demanded per unit of the selling asset.
///
/// Equality and ordering are by value, so `1/2 == 2/4`. Deserialization
/// goes through [`Price::new`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawPrice")]
pub struct Price {
    pub n: u32,
    pub d: u32,
}

#[derive(Deserialize)]
struct RawPrice {
    n: u32,
    d: u32,
}

impl TryFrom<RawPrice> for Price {
    type Error = ClearbatchError;

    fn try_from(raw: RawPrice) -> Result<Self> {
        Self::new(raw.n, raw.d)
    }
}

impl Price {
    pub fn new(n: u32, d: u32) -> Result<Self> {
        if n == 0 || d == 0 {
            return Err(ClearbatchError::InvalidOffer {
                reason: format!("price {n}/{d} is not positive"),
            });
        }
        if n > constants::MAX_PRICE_COMPONENT || d > constants::MAX_PRICE_COMPONENT {
            return Err(ClearbatchError::InvalidOffer {
                reason: format!("price {n}/{d} exceeds 31-bit components"),
            });
        }
        Ok(Self { n, d })
    }

    /// The zero price, only used as the first row of cumulative tables.
    #[must_use]
    pub const fn zero() -> Self {
        Self { n: 0, d: 1 }
    }

    /// `self <= sell_price / buy_price`, by cross-multiplication.
    #[must_use]
    pub fn lte_ratio(&self, sell_price: u64, buy_price: u64) -> bool {
        u128::from(self.n) * u128::from(buy_price) <= u128::from(self.d) * u128::from(sell_price)
    }

    /// `self < sell_price / buy_price`, by cross-multiplication.
    #[must_use]
    pub fn lt_ratio(&self, sell_price: u64, buy_price: u64) -> bool {
        u128::from(self.n) * u128::from(buy_price) < u128::from(self.d) * u128::from(sell_price)
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Price {}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (u64::from(self.n) * u64::from(other.d)).cmp(&(u64::from(other.n) * u64::from(self.d)))
    }
}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.n, self.d)
    }
}

// ---------------------------------------------------------------------------
// PriceVector
// ---------------------------------------------------------------------------

/// One asset's entry in a serialized price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrice {
    pub asset: Asset,
    pub price: u64,
}

/// Asset -> 64-bit price, always iterated in canonical asset order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceVector {
    prices: BTreeMap<Asset, u64>,
}

impl PriceVector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Price of `asset`, or [`ClearbatchError::MissingPrice`].
    pub fn get(&self, asset: &Asset) -> Result<u64> {
        self.prices
            .get(asset)
            .copied()
            .ok_or_else(|| ClearbatchError::MissingPrice(asset.clone()))
    }

    pub fn set(&mut self, asset: Asset, price: u64) {
        self.prices.insert(asset, price);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, u64)> {
        self.prices.iter().map(|(asset, price)| (asset, *price))
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.prices.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    #[must_use]
    pub fn to_list(&self) -> Vec<AssetPrice> {
        self.iter()
            .map(|(asset, price)| AssetPrice {
                asset: asset.clone(),
                price,
            })
            .collect()
    }
}

impl FromIterator<(Asset, u64)> for PriceVector {
    fn from_iter<I: IntoIterator<Item = (Asset, u64)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().collect(),
        }
    }
}

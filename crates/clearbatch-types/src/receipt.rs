//! Per-offer and per-pool clearing receipts, and the batch results bundle.

use serde::{Deserialize, Serialize};

use crate::{AccountId, Asset, AssetPair, AssetPrice, PoolId};

/// What one executed offer sold and bought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferClearingStatus {
    pub source_account: AccountId,
    pub seq_num: u64,
    pub offer_index: u32,
    pub pair: AssetPair,
    pub sold_amount: i64,
    pub bought_amount: i64,
}

/// What a pool sold and bought while absorbing a pair's residual flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolClearingStatus {
    pub pool_id: PoolId,
    pub sold_asset: Asset,
    pub bought_asset: Asset,
    pub sold_amount: i64,
    pub bought_amount: i64,
}

/// Rounding surplus routed to a sink for one asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingSurplus {
    pub asset: Asset,
    pub amount: i64,
}

/// Output of one cleared batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResults {
    /// Offer receipts, in clearing order (pairs canonical, offers by price).
    pub offers: Vec<OfferClearingStatus>,
    pub pools: Vec<PoolClearingStatus>,
    /// Final clearing prices in canonical asset order.
    pub prices: Vec<AssetPrice>,
    pub rounding_surplus: Vec<RoundingSurplus>,
    /// Digest over everything above; empty until sealed by the engine.
    pub results_root: [u8; 32],
}

impl BatchResults {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty() && self.pools.is_empty()
    }

    /// Total sold by all offers in one pair.
    #[must_use]
    pub fn total_sold(&self, pair: &AssetPair) -> i64 {
        self.offers
            .iter()
            .filter(|status| &status.pair == pair)
            .map(|status| status.sold_amount)
            .sum()
    }

    #[must_use]
    pub fn results_root_hex(&self) -> String {
        hex::encode(self.results_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_filter_by_pair() {
        let usd = Asset::test_issued("USD");
        let pair = AssetPair::new(Asset::Native, usd.clone()).unwrap();
        let status = |pair: AssetPair, sold| OfferClearingStatus {
            source_account: AccountId::test_account(1),
            seq_num: 1,
            offer_index: 0,
            pair,
            sold_amount: sold,
            bought_amount: 0,
        };
        let results = BatchResults {
            offers: vec![status(pair.clone(), 5), status(pair.reverse(), 7), status(pair.clone(), 3)],
            ..BatchResults::default()
        };
        assert_eq!(results.total_sold(&pair), 8);
        assert_eq!(results.total_sold(&pair.reverse()), 7);
        assert!(!results.is_empty());
    }

    #[test]
    fn results_serde_roundtrip() {
        let results = BatchResults {
            prices: vec![AssetPrice {
                asset: Asset::Native,
                price: 1 << 32,
            }],
            ..BatchResults::default()
        };
        let json = serde_json::to_string(&results).unwrap();
        let back: BatchResults = serde_json::from_str(&json).unwrap();
        assert_eq!(results, back);
    }
}

//! Results-root hashing for cross-node consistency.
//!
//! Every node clearing the same batch must produce the same
//! `BatchResults`. The `results_root` commits to all of it so nodes can
//! compare one digest instead of full payloads.

use clearbatch_types::constants::RESULTS_ROOT_DOMAIN;
use clearbatch_types::{AssetPair, BatchResults};
use sha2::{Digest, Sha256};

fn hash_pair(hasher: &mut Sha256, pair: &AssetPair) {
    pair.selling.hash_into(hasher);
    pair.buying.hash_into(hasher);
}

/// Compute the results root over a batch's receipts, prices and surplus.
///
/// Covers, in order:
/// - Offer receipts (account, sequence, index, pair, amounts)
/// - Pool receipts
/// - Final prices
/// - Rounding surplus
///
/// Every list is length-prefixed; integers are little-endian. The stored
/// `results_root` field itself is not hashed.
#[must_use]
pub fn compute_results_root(results: &BatchResults) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(RESULTS_ROOT_DOMAIN);

    hasher.update((results.offers.len() as u64).to_le_bytes());
    for status in &results.offers {
        hasher.update(status.source_account.as_bytes());
        hasher.update(status.seq_num.to_le_bytes());
        hasher.update(status.offer_index.to_le_bytes());
        hash_pair(&mut hasher, &status.pair);
        hasher.update(status.sold_amount.to_le_bytes());
        hasher.update(status.bought_amount.to_le_bytes());
    }

    hasher.update((results.pools.len() as u64).to_le_bytes());
    for status in &results.pools {
        hasher.update(status.pool_id.as_bytes());
        status.sold_asset.hash_into(&mut hasher);
        status.bought_asset.hash_into(&mut hasher);
        hasher.update(status.sold_amount.to_le_bytes());
        hasher.update(status.bought_amount.to_le_bytes());
    }

    hasher.update((results.prices.len() as u64).to_le_bytes());
    for entry in &results.prices {
        entry.asset.hash_into(&mut hasher);
        hasher.update(entry.price.to_le_bytes());
    }

    hasher.update((results.rounding_surplus.len() as u64).to_le_bytes());
    for entry in &results.rounding_surplus {
        entry.asset.hash_into(&mut hasher);
        hasher.update(entry.amount.to_le_bytes());
    }

    hasher.finalize().into()
}

/// Recompute the root and compare with the stored one.
#[must_use]
pub fn verify_results_root(results: &BatchResults) -> bool {
    let computed = compute_results_root(results);
    if computed != results.results_root {
        tracing::warn!(
            stored = %hex::encode(results.results_root),
            computed = %hex::encode(computed),
            "Results root mismatch"
        );
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use clearbatch_types::{AccountId, Asset, AssetPrice, OfferClearingStatus};

    use super::*;

    fn receipt(seq: u64, sold: i64) -> OfferClearingStatus {
        OfferClearingStatus {
            source_account: AccountId::test_account(1),
            seq_num: seq,
            offer_index: 0,
            pair: AssetPair::new(Asset::Native, Asset::test_issued("USD")).unwrap(),
            sold_amount: sold,
            bought_amount: sold / 2,
        }
    }

    fn results(offers: Vec<OfferClearingStatus>) -> BatchResults {
        BatchResults {
            offers,
            prices: vec![AssetPrice {
                asset: Asset::Native,
                price: 1 << 32,
            }],
            ..BatchResults::default()
        }
    }

    #[test]
    fn empty_results_deterministic() {
        let empty = BatchResults::default();
        assert_eq!(compute_results_root(&empty), compute_results_root(&empty));
    }

    #[test]
    fn different_amounts_different_root() {
        let a = results(vec![receipt(1, 100)]);
        let b = results(vec![receipt(1, 101)]);
        assert_ne!(compute_results_root(&a), compute_results_root(&b));
    }

    #[test]
    fn order_matters() {
        let ab = results(vec![receipt(1, 100), receipt(2, 100)]);
        let ba = results(vec![receipt(2, 100), receipt(1, 100)]);
        assert_ne!(compute_results_root(&ab), compute_results_root(&ba));
    }

    #[test]
    fn stored_root_is_not_hashed() {
        let mut sealed = results(vec![receipt(1, 100)]);
        let root = compute_results_root(&sealed);
        sealed.results_root = root;
        assert_eq!(compute_results_root(&sealed), root);
        assert!(verify_results_root(&sealed));

        sealed.offers[0].bought_amount += 1;
        assert!(!verify_results_root(&sealed));
    }
}

//! Rounding surplus accounting.
//!
//! Invariant enforced after every cleared batch:
//! ```text
//! ∀ asset: Σ(taken from sellers) - Σ(given to buyers) >= 0
//! ```
//!
//! Sell amounts round up and buy amounts round down, so the market keeps
//! a few units of dust per asset. A negative balance here means the batch
//! paid out more than it collected and must be aborted.

use std::collections::BTreeMap;

use clearbatch_types::{Asset, ClearbatchError, LedgerState, Result, RoundingSurplus};

use crate::clearing_target::ClearingTarget;

/// Per-asset totals of what the market took in and paid out.
#[derive(Debug, Clone, Default)]
pub struct RoundingSurplusTracker {
    taken: BTreeMap<Asset, i128>,
    given: BTreeMap<Asset, i128>,
}

impl RoundingSurplusTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record everything one pair realized, offers and pool alike.
    pub fn record_target(&mut self, target: &ClearingTarget) {
        let pair = target.pair();
        *self.taken.entry(pair.selling.clone()).or_insert(0) += i128::from(target.realized_sell_amount());
        *self.given.entry(pair.buying.clone()).or_insert(0) += i128::from(target.realized_buy_amount());
    }

    #[must_use]
    pub fn total_taken(&self, asset: &Asset) -> i128 {
        self.taken.get(asset).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_given(&self, asset: &Asset) -> i128 {
        self.given.get(asset).copied().unwrap_or(0)
    }

    /// Taken minus given; may be negative before verification.
    #[must_use]
    pub fn surplus(&self, asset: &Asset) -> i128 {
        self.total_taken(asset) - self.total_given(asset)
    }

    /// Every asset seen on either side, in canonical order.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.taken.keys().chain(self.given.keys()).cloned().collect();
        assets.sort();
        assets.dedup();
        assets
    }

    /// Nonzero surplus per asset.
    ///
    /// # Errors
    /// [`ClearbatchError::MarketDeficit`] for the first asset whose surplus
    /// is negative, or `InvalidAmount` if one does not fit 64 bits.
    pub fn verify(&self) -> Result<Vec<RoundingSurplus>> {
        let mut surplus = Vec::new();
        for asset in self.tracked_assets() {
            let amount = self.surplus(&asset);
            if amount < 0 {
                tracing::warn!(
                    asset = %asset,
                    taken = %self.total_taken(&asset),
                    given = %self.total_given(&asset),
                    "Market paid out more than it collected"
                );
                return Err(ClearbatchError::MarketDeficit {
                    asset,
                    deficit: -amount,
                });
            }
            if amount == 0 {
                continue;
            }
            let amount = i64::try_from(amount).map_err(|_| ClearbatchError::InvalidAmount {
                reason: format!("rounding surplus {amount} of {asset} out of range"),
            })?;
            surplus.push(RoundingSurplus { asset, amount });
        }
        Ok(surplus)
    }

    /// Verify, then credit each asset's surplus to its sink: the fee pool
    /// for the native asset, the issuer for an issued one.
    pub fn route_to_sinks(&self, ledger: &mut dyn LedgerState) -> Result<Vec<RoundingSurplus>> {
        let surplus = self.verify()?;
        for entry in &surplus {
            match entry.asset.issuer() {
                None => ledger.add_to_fee_pool(entry.amount)?,
                Some(issuer) => ledger.add_balance(issuer, &entry.asset, entry.amount)?,
            }
        }
        Ok(surplus)
    }
}

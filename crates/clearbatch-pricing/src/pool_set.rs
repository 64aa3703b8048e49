//! Every constant-product pool visible to one batch.
//!
//! Pools are keyed by their canonical asset pair (lower asset first), so
//! a single backend serves both trading directions.

use std::collections::BTreeMap;

use clearbatch_types::{AmmConfig, Asset, AssetPair, ClearbatchError, LedgerState, PoolId, PriceVector, Result};

use crate::demand::SupplyDemand;
use crate::liquidity_pool::{LedgerPool, LiquidityPoolBackend, LiquidityPoolFrame, SimulatedPool};

/// Loaded pools for one round.
#[derive(Default)]
pub struct LiquidityPoolSet {
    pools: BTreeMap<(Asset, Asset), Box<dyn LiquidityPoolBackend>>,
}

fn canonical_key(pair: &AssetPair) -> (Asset, Asset) {
    let (low, high) = pair.canonical_assets();
    (low.clone(), high.clone())
}

impl LiquidityPoolSet {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every pool between the given assets from the ledger.
    pub fn load<L: LedgerState + ?Sized>(assets: &[Asset], ledger: &L) -> Self {
        let mut pools: BTreeMap<(Asset, Asset), Box<dyn LiquidityPoolBackend>> = BTreeMap::new();
        for (i, low) in assets.iter().enumerate() {
            for high in &assets[i + 1..] {
                if let Some(entry) = ledger.load_pool(low, high) {
                    let key = (entry.asset_a.clone(), entry.asset_b.clone());
                    pools.insert(key, Box::new(LedgerPool::new(entry)));
                }
            }
        }
        tracing::debug!(pools = pools.len(), "Loaded ledger pools");
        Self { pools }
    }

    /// Build in-memory pools from simulation configs.
    pub fn simulated(configs: &[AmmConfig]) -> Result<Self> {
        let mut pools: BTreeMap<(Asset, Asset), Box<dyn LiquidityPoolBackend>> = BTreeMap::new();
        for config in configs {
            if config.asset_a == config.asset_b {
                return Err(ClearbatchError::InvalidPool {
                    reason: format!("pool trades {} against itself", config.asset_a),
                });
            }
            if config.amount_a < 0 || config.amount_b < 0 {
                return Err(ClearbatchError::InvalidPool {
                    reason: format!("negative reserves in pool {}/{}", config.asset_a, config.asset_b),
                });
            }
            let (key, reserve_a, reserve_b) = if config.asset_a < config.asset_b {
                (
                    (config.asset_a.clone(), config.asset_b.clone()),
                    config.amount_a,
                    config.amount_b,
                )
            } else {
                (
                    (config.asset_b.clone(), config.asset_a.clone()),
                    config.amount_b,
                    config.amount_a,
                )
            };
            let pool_id = PoolId::for_assets(&key.0, &key.1);
            if pools.contains_key(&key) {
                return Err(ClearbatchError::InvalidPool {
                    reason: format!("duplicate pool {pool_id}"),
                });
            }
            pools.insert(key, Box::new(SimulatedPool::new(pool_id, reserve_a, reserve_b, config.fee)));
        }
        Ok(Self { pools })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// The pool between a pair's assets, viewed from that pair's direction.
    #[must_use]
    pub fn frame<'a>(
        &'a self,
        pair: &'a AssetPair,
    ) -> Option<LiquidityPoolFrame<'a, dyn LiquidityPoolBackend>> {
        self.pools
            .get(&canonical_key(pair))
            .map(|pool| LiquidityPoolFrame::new(pool.as_ref(), pair))
    }

    pub fn backend_mut(&mut self, pair: &AssetPair) -> Option<&mut (dyn LiquidityPoolBackend + 'static)> {
        self.pools.get_mut(&canonical_key(pair)).map(|pool| pool.as_mut())
    }

    #[must_use]
    pub fn reserves(&self, a: &Asset, b: &Asset) -> Option<(i64, i64)> {
        let key = if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) };
        self.pools.get(&key).map(|pool| pool.reserves())
    }

    // =================================================================
    // Demand
    // =================================================================

    /// Accumulate both directions of every pool at `prices`.
    pub fn demand_query(&self, prices: &PriceVector, supply_demand: &mut SupplyDemand) -> Result<()> {
        for ((low, high), pool) in &self.pools {
            let forward = AssetPair::new_unchecked(low.clone(), high.clone());
            let backward = forward.reverse();
            for pair in [&forward, &backward] {
                let frame = LiquidityPoolFrame::new(pool.as_ref(), pair);
                let amount = frame.amount_offered_for_sale_times_sell_price(
                    prices.get(&pair.selling)?,
                    prices.get(&pair.buying)?,
                );
                if amount != 0 {
                    supply_demand.add_supply_demand(pair, amount);
                }
            }
        }
        Ok(())
    }

    /// Flow the pool between a pair's assets could sell in that direction.
    pub fn demand_query_one_asset_pair(&self, pair: &AssetPair, prices: &PriceVector) -> Result<i128> {
        let Some(frame) = self.frame(pair) else {
            return Ok(0);
        };
        Ok(frame.amount_offered_for_sale_times_sell_price(
            prices.get(&pair.selling)?,
            prices.get(&pair.buying)?,
        ))
    }

    /// Write every ledger-backed pool that changed back to the ledger.
    pub fn flush(&self, ledger: &mut dyn LedgerState) -> Result<()> {
        for pool in self.pools.values() {
            pool.flush(ledger)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LiquidityPoolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.pools.iter().map(|(key, pool)| (key, pool.reserves())))
            .finish()
    }
}

//! Aggregate demand over order books and pools.

use clearbatch_types::{AssetPair, PriceVector, Result};

use crate::demand::SupplyDemand;
use crate::orderbook_manager::OrderbookManager;
use crate::pool_set::LiquidityPoolSet;
use crate::solver::TradeMaximizingSolver;

/// Read-only view over everything that trades in one batch.
#[derive(Debug, Clone, Copy)]
pub struct DemandOracle<'a> {
    orderbooks: &'a OrderbookManager,
    pools: &'a LiquidityPoolSet,
}

impl<'a> DemandOracle<'a> {
    #[must_use]
    pub fn new(orderbooks: &'a OrderbookManager, pools: &'a LiquidityPoolSet) -> Self {
        Self { orderbooks, pools }
    }

    /// Smoothed supply and demand at `prices`, as seen by the price search.
    pub fn demand_query(&self, prices: &PriceVector, smooth_mult: u8, tax_rate: u8) -> Result<SupplyDemand> {
        let mut supply_demand = SupplyDemand::with_tax_rate(tax_rate);
        self.orderbooks.demand_query(prices, &mut supply_demand, smooth_mult)?;
        self.pools.demand_query(prices, &mut supply_demand)?;
        Ok(supply_demand)
    }

    /// Unsmoothed flow that can actually cross `pair` at `prices`.
    pub fn demand_query_one_asset_pair(&self, pair: &AssetPair, prices: &PriceVector) -> Result<i128> {
        let books = self.orderbooks.demand_query_one_asset_pair(pair, prices)?;
        let pools = self.pools.demand_query_one_asset_pair(pair, prices)?;
        Ok(books.saturating_add(pools))
    }

    /// Bound every ordered pair of priced assets by its crossable flow.
    ///
    /// Pairs with nothing to trade are left unbounded, which pins their
    /// flow at zero. Returns the number of bounds set.
    pub fn set_solver_upper_bounds(
        &self,
        solver: &mut TradeMaximizingSolver,
        prices: &PriceVector,
    ) -> Result<usize> {
        let mut bounded = 0usize;
        for sell in prices.assets() {
            for buy in prices.assets() {
                if sell == buy {
                    continue;
                }
                let pair = AssetPair::new_unchecked(sell.clone(), buy.clone());
                let supply = self.demand_query_one_asset_pair(&pair, prices)?;
                if supply != 0 {
                    solver.set_upper_bound(&pair, supply)?;
                    bounded += 1;
                }
            }
        }
        tracing::debug!(bounded, "Solver upper bounds set");
        Ok(bounded)
    }
}

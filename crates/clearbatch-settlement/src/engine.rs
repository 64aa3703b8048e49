//! The end-to-end batch pipeline.
//!
//! ## Algorithm
//!
//! 1. Seal the order books (cumulative tables built once)
//! 2. Tatonnement from the configured starting prices
//! 3. Bound every tradeable pair at the final prices and solve for the
//!    trade-maximizing flows
//! 4. Clear every pair against its offers and pool, route rounding surplus
//! 5. Write mutated pools back to the ledger
//! 6. Seal the results with their results root
//!
//! The engine owns no state between rounds. Rollback on error belongs to
//! the ledger: snapshot before calling [`run_batch`], restore on `Err`.

use clearbatch_pricing::{
    compute_results_root, DemandOracle, LiquidityPoolSet, OrderbookManager, TatonnementOracle,
    TradeMaximizingSolver,
};
use clearbatch_types::{AssetPair, BatchResults, ConfigSnapshot, IocOffer, LedgerState, Result};

use crate::batch_clearer::clear_batch;
use crate::batch_solution::BatchSolution;

/// Admit one offer into the open batch.
///
/// # Errors
/// `InvalidAssetPair` for a pair outside the configured assets, and the
/// order book's lifecycle errors once the batch is sealed.
pub fn submit_offer(
    config: &ConfigSnapshot,
    orderbooks: &mut OrderbookManager,
    pair: AssetPair,
    offer: IocOffer,
) -> Result<()> {
    config.validate_offer(&pair, &offer)?;
    orderbooks.add_offer(pair, offer)
}

/// Discover prices and flows for the open batch, then settle it.
///
/// # Errors
/// Lifecycle errors if the batch was already sealed or cleared, and any
/// fatal error from price discovery, the solver or clearing. The ledger
/// may be partially mutated on `Err`.
pub fn run_batch(
    ledger: &mut dyn LedgerState,
    orderbooks: &mut OrderbookManager,
    pools: &mut LiquidityPoolSet,
    config: &ConfigSnapshot,
) -> Result<BatchResults> {
    // 1. Seal
    orderbooks.seal_batch()?;

    let (solution, accepted) = {
        let demand = DemandOracle::new(orderbooks, pools);

        // 2. Prices
        let mut tatonnement = TatonnementOracle::new(demand, config.controls)?;
        let outcome = tatonnement.compute_prices(config.starting_prices()?)?;

        // 3. Flows
        let mut solver = TradeMaximizingSolver::new(config.assets().to_vec());
        let bounded = demand.set_solver_upper_bounds(&mut solver, &outcome.prices)?;
        solver.solve()?;
        tracing::debug!(bounded, "Solver finished");

        (BatchSolution::from_solver(&solver, outcome.prices)?, outcome.accepted)
    };

    // 4. Clear
    let mut results = clear_batch(ledger, orderbooks, pools, &solution)?;

    // 5. Pools
    pools.flush(ledger)?;

    // 6. Seal results
    results.results_root = compute_results_root(&results);

    tracing::info!(
        assets = config.assets().len(),
        accepted_rounds = accepted,
        traded_pairs = solution.flows().len(),
        offers = results.offers.len(),
        pools = results.pools.len(),
        results_root = %results.results_root_hex(),
        "Batch complete"
    );
    Ok(results)
}

//! Batch clearing: executes every clearing target against its order book
//! and pool, then settles the rounding surplus.
//!
//! ## Algorithm
//!
//! For each traded pair, in canonical pair order:
//! 1. Walk the pair's offers in ascending limit price, clearing each one
//!    until the target is met or an offer's limit exceeds the clearing ratio
//! 2. Mark the book cleared
//! 3. Sell any residual into the pair's pool; without a pool, a residual
//!    is fatal
//!
//! Then close every remaining book, verify per-asset surplus and route it
//! to the sinks. Any error leaves the ledger partially written; the caller
//! discards the round.

use clearbatch_pricing::{LiquidityPoolSet, OrderbookManager};
use clearbatch_types::{BatchResults, ClearbatchError, LedgerState, OfferClearingStatus, Result};

use crate::batch_solution::BatchSolution;
use crate::clearing_target::ClearingTarget;
use crate::rounding::RoundingSurplusTracker;

/// Settle `solution` against the sealed books and the pools.
///
/// The returned results carry no `results_root`; sealing them is the
/// pipeline's job.
pub fn clear_batch(
    ledger: &mut dyn LedgerState,
    orderbooks: &mut OrderbookManager,
    pools: &mut LiquidityPoolSet,
    solution: &BatchSolution,
) -> Result<BatchResults> {
    orderbooks.ensure_clearable()?;

    let mut results = BatchResults::default();
    let mut tracker = RoundingSurplusTracker::new();

    for mut target in solution.produce_clearing_targets()? {
        clear_offers(ledger, orderbooks, &mut target, &mut results.offers)?;

        if !target.is_done() {
            let Some(pool) = pools.backend_mut(target.pair()) else {
                tracing::warn!(
                    pair = %target.pair(),
                    realized = %target.realized_clear_target(),
                    total = %target.total_clear_target(),
                    "Offers exhausted and no pool to absorb the residual"
                );
                return Err(ClearbatchError::ClearingTargetNotMet {
                    pair: target.pair().clone(),
                    realized: target.realized_clear_target(),
                    total: target.total_clear_target(),
                });
            };
            results.pools.push(target.finish_with_liquidity_pool(pool)?);
        }

        tracing::debug!(
            pair = %target.pair(),
            target = %target.total_clear_target(),
            sold = target.realized_sell_amount(),
            bought = target.realized_buy_amount(),
            "Pair cleared"
        );
        tracker.record_target(&target);
    }

    orderbooks.finish_clearing()?;
    results.rounding_surplus = tracker.route_to_sinks(ledger)?;
    results.prices = solution.prices().to_list();

    tracing::info!(
        pairs = solution.flows().len(),
        offers = results.offers.len(),
        pools = results.pools.len(),
        surplus_assets = results.rounding_surplus.len(),
        "Batch cleared"
    );
    Ok(results)
}

fn clear_offers(
    ledger: &mut dyn LedgerState,
    orderbooks: &mut OrderbookManager,
    target: &mut ClearingTarget,
    receipts: &mut Vec<OfferClearingStatus>,
) -> Result<()> {
    let Some(book) = orderbooks.orderbook(target.pair()) else {
        return Ok(());
    };
    for offer in book.offers() {
        if target.is_done() || !target.is_compatible(offer) {
            break;
        }
        receipts.push(target.clear_offer(ledger, offer)?);
    }
    if let Some(book) = orderbooks.orderbook_mut(target.pair()) {
        book.mark_cleared()?;
    }
    Ok(())
}

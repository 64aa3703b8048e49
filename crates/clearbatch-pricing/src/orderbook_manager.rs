//! All order books of one batch, keyed by asset pair.
//!
//! Lifecycle: open (offers arrive, child scopes merge in) -> sealed
//! (tables built, demand queries allowed) -> cleared. Each transition is
//! one-way and guarded at every public entry point.

use std::collections::BTreeMap;

use clearbatch_types::{AssetPair, ClearbatchError, IocOffer, PriceVector, Result};

use crate::demand::SupplyDemand;
use crate::orderbook::IocOrderbook;

/// Order books for every pair that received offers this batch.
#[derive(Debug, Clone, Default)]
pub struct OrderbookManager {
    books: BTreeMap<AssetPair, IocOrderbook>,
    sealed: bool,
    cleared: bool,
}

impl OrderbookManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    #[must_use]
    pub fn num_open_orderbooks(&self) -> usize {
        self.books.len()
    }

    #[must_use]
    pub fn num_offers(&self) -> usize {
        self.books.values().map(IocOrderbook::len).sum()
    }

    #[must_use]
    pub fn orderbook(&self, pair: &AssetPair) -> Option<&IocOrderbook> {
        self.books.get(pair)
    }

    pub fn orderbook_mut(&mut self, pair: &AssetPair) -> Option<&mut IocOrderbook> {
        self.books.get_mut(pair)
    }

    pub fn orderbooks(&self) -> impl Iterator<Item = &IocOrderbook> {
        self.books.values()
    }

    // =================================================================
    // Intake
    // =================================================================

    /// Add one offer to the open batch.
    pub fn add_offer(&mut self, pair: AssetPair, offer: IocOffer) -> Result<()> {
        self.ensure_open()?;
        self.books
            .entry(pair.clone())
            .or_insert_with(|| IocOrderbook::new(pair))
            .add_offer(offer)
    }

    /// Merge a nested scope's books into this one, pair by pair.
    pub fn commit_child(&mut self, child: &Self) -> Result<()> {
        self.ensure_open()?;
        if child.sealed || child.cleared {
            return Err(ClearbatchError::BatchAlreadySealed);
        }
        for (pair, book) in &child.books {
            self.books
                .entry(pair.clone())
                .or_insert_with(|| IocOrderbook::new(pair.clone()))
                .commit_child(book)?;
        }
        Ok(())
    }

    /// Drop every offer. Used when a round is abandoned.
    pub fn clear(&mut self) {
        self.books.clear();
        self.sealed = false;
        self.cleared = false;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.cleared {
            return Err(ClearbatchError::AlreadyCleared);
        }
        if self.sealed {
            return Err(ClearbatchError::BatchAlreadySealed);
        }
        Ok(())
    }

    // =================================================================
    // Sealing
    // =================================================================

    /// Close intake and precompute every book's cumulative table.
    pub fn seal_batch(&mut self) -> Result<()> {
        self.ensure_open()?;
        for book in self.books.values_mut() {
            book.seal()?;
        }
        self.sealed = true;
        tracing::debug!(
            books = self.books.len(),
            offers = self.num_offers(),
            "Order books sealed"
        );
        Ok(())
    }

    fn ensure_queryable(&self) -> Result<()> {
        if !self.sealed {
            return Err(ClearbatchError::BatchNotSealed);
        }
        if self.cleared {
            return Err(ClearbatchError::AlreadyCleared);
        }
        Ok(())
    }

    // =================================================================
    // Demand
    // =================================================================

    /// Accumulate every book's (smoothed) flow at `prices` into `supply_demand`.
    pub fn demand_query(
        &self,
        prices: &PriceVector,
        supply_demand: &mut SupplyDemand,
        smooth_mult: u8,
    ) -> Result<()> {
        self.ensure_queryable()?;
        for (pair, book) in &self.books {
            let sell_price = prices.get(&pair.selling)?;
            let buy_price = prices.get(&pair.buying)?;
            let amount =
                book.cumulative_offered_for_sale_times_price(sell_price, buy_price, smooth_mult)?;
            supply_demand.add_supply_demand(pair, amount);
        }
        Ok(())
    }

    /// Unsmoothed flow that could cross `pair` at `prices`; 0 without a book.
    pub fn demand_query_one_asset_pair(&self, pair: &AssetPair, prices: &PriceVector) -> Result<i128> {
        self.ensure_queryable()?;
        let Some(book) = self.books.get(pair) else {
            return Ok(0);
        };
        book.cumulative_offered_for_sale_times_price(
            prices.get(&pair.selling)?,
            prices.get(&pair.buying)?,
            0,
        )
    }

    // =================================================================
    // Clearing
    // =================================================================

    /// Guard for the start of clearing: sealed and not yet cleared.
    pub fn ensure_clearable(&self) -> Result<()> {
        self.ensure_queryable()
    }

    /// Terminal transition: mark every remaining book and the batch cleared.
    pub fn finish_clearing(&mut self) -> Result<()> {
        self.ensure_queryable()?;
        for book in self.books.values_mut() {
            if !book.is_cleared() {
                book.mark_cleared()?;
            }
        }
        self.cleared = true;
        Ok(())
    }
}

//! The IOC order book for a single asset pair.
//!
//! Offers are kept in a `BTreeSet` ordered by limit price, then by ordering
//! hash. Once the batch is sealed the book builds a cumulative table
//! (one row per distinct limit price) so that demand at any price ratio
//! costs two binary searches instead of a walk over every offer.
//!
//! Fixed-point convention: `cumulative_offered_times_price` carries
//! [`OFFERED_TIMES_PRICE_RADIX`] fractional bits.

use std::collections::BTreeSet;

use clearbatch_types::constants::OFFERED_TIMES_PRICE_RADIX;
use clearbatch_types::{AssetPair, ClearbatchError, IocOffer, Price, Result};

const RADIX_MASK: i128 = (1i128 << OFFERED_TIMES_PRICE_RADIX) - 1;

/// One row of the cumulative table: totals over every offer whose limit
/// price is at most `marginal_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceCompStats {
    pub marginal_price: Price,
    pub cumulative_offered_for_sale: i128,
    pub cumulative_offered_times_price: i128,
}

impl PriceCompStats {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            marginal_price: Price::zero(),
            cumulative_offered_for_sale: 0,
            cumulative_offered_times_price: 0,
        }
    }
}

/// `amount * price` with [`OFFERED_TIMES_PRICE_RADIX`] fractional bits,
/// truncated.
#[must_use]
pub fn offered_times_price(amount: i64, price: Price) -> i128 {
    ((i128::from(amount) * i128::from(price.n)) << OFFERED_TIMES_PRICE_RADIX) / i128::from(price.d)
}

/// `(value * multiplier) >> RADIX` without overflowing on `value * multiplier`.
fn wide_mult_shift_down(value: i128, multiplier: u64) -> i128 {
    let mult = i128::from(multiplier);
    let low = value & RADIX_MASK;
    let high = value >> OFFERED_TIMES_PRICE_RADIX;
    high * mult + ((low * mult) >> OFFERED_TIMES_PRICE_RADIX)
}

/// `price * (1 - 2^-smooth_mult)`; a shift of 0 leaves the price alone.
#[must_use]
pub fn apply_smooth_mult(price: u64, smooth_mult: u8) -> u64 {
    if smooth_mult == 0 {
        return price;
    }
    price - price.checked_shr(u32::from(smooth_mult)).unwrap_or(0)
}

/// All IOC offers selling one asset for another in the current batch.
#[derive(Debug, Clone)]
pub struct IocOrderbook {
    pair: AssetPair,
    offers: BTreeSet<IocOffer>,
    precomputed: Vec<PriceCompStats>,
    sealed: bool,
    cleared: bool,
}

impl IocOrderbook {
    #[must_use]
    pub fn new(pair: AssetPair) -> Self {
        Self {
            pair,
            offers: BTreeSet::new(),
            precomputed: Vec::new(),
            sealed: false,
            cleared: false,
        }
    }

    #[must_use]
    pub fn pair(&self) -> &AssetPair {
        &self.pair
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.cleared
    }

    /// Offers in canonical order (ascending limit price, then hash).
    pub fn offers(&self) -> impl Iterator<Item = &IocOffer> {
        self.offers.iter()
    }

    // =================================================================
    // Insertion
    // =================================================================

    pub fn add_offer(&mut self, offer: IocOffer) -> Result<()> {
        if self.cleared {
            return Err(ClearbatchError::AlreadyCleared);
        }
        if self.sealed {
            return Err(ClearbatchError::BatchAlreadySealed);
        }
        self.offers.insert(offer);
        Ok(())
    }

    /// Merge a child scope's offers into this book (set union).
    pub fn commit_child(&mut self, child: &Self) -> Result<()> {
        if child.pair != self.pair {
            return Err(ClearbatchError::PairMismatch {
                expected: self.pair.clone(),
                actual: child.pair.clone(),
            });
        }
        if self.cleared || child.cleared {
            return Err(ClearbatchError::AlreadyCleared);
        }
        if self.sealed {
            return Err(ClearbatchError::BatchAlreadySealed);
        }
        self.offers.extend(child.offers.iter().cloned());
        Ok(())
    }

    // =================================================================
    // Sealing and precomputation
    // =================================================================

    /// Freeze the offer set and build the cumulative table. Runs once.
    pub fn seal(&mut self) -> Result<()> {
        if self.cleared {
            return Err(ClearbatchError::AlreadyCleared);
        }
        if self.sealed {
            return Err(ClearbatchError::BatchAlreadySealed);
        }
        self.precomputed = Self::build_table(&self.offers);
        self.sealed = true;
        Ok(())
    }

    fn build_table(offers: &BTreeSet<IocOffer>) -> Vec<PriceCompStats> {
        let mut table = Vec::new();
        let mut stats = PriceCompStats::zero();
        for offer in offers {
            if offer.min_price != stats.marginal_price {
                table.push(stats);
                stats.marginal_price = offer.min_price;
            }
            stats.cumulative_offered_for_sale += i128::from(offer.sell_amount);
            stats.cumulative_offered_times_price +=
                offered_times_price(offer.sell_amount, offer.min_price);
        }
        table.push(stats);
        table
    }

    /// The cumulative table (empty until sealed).
    #[must_use]
    pub fn precomputed_table(&self) -> &[PriceCompStats] {
        &self.precomputed
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Totals over every offer with limit price `<= sell_price / buy_price`.
    pub fn price_comp_stats(&self, sell_price: u64, buy_price: u64) -> Result<PriceCompStats> {
        if !self.sealed {
            return Err(ClearbatchError::BatchNotSealed);
        }
        // Row 0 has the zero price and always qualifies, so idx >= 1.
        let idx = self
            .precomputed
            .partition_point(|row| row.marginal_price.lte_ratio(sell_price, buy_price));
        Ok(self.precomputed[idx.saturating_sub(1)])
    }

    /// Value (in `sell_price` units) the book sells at these prices.
    ///
    /// Offers below `effective * (1 - 2^-smooth_mult)` execute fully,
    /// offers above the effective price not at all, and offers in
    /// between linearly, so the result is continuous in the prices.
    pub fn cumulative_offered_for_sale_times_price(
        &self,
        sell_price: u64,
        buy_price: u64,
        smooth_mult: u8,
    ) -> Result<i128> {
        let partial = self.price_comp_stats(sell_price, buy_price)?;
        let full = self.price_comp_stats(apply_smooth_mult(sell_price, smooth_mult), buy_price)?;

        let full_endow = full.cumulative_offered_for_sale;
        let partial_endow = partial.cumulative_offered_for_sale - full_endow;
        let partial_times_price =
            partial.cumulative_offered_times_price - full.cumulative_offered_times_price;

        let sell = i128::from(sell_price);
        // Non-negative: every offer in the band has limit <= sell / buy.
        let partial_sum =
            partial_endow * sell - wide_mult_shift_down(partial_times_price, buy_price);

        Ok(full_endow * sell + (partial_sum << smooth_mult))
    }

    // =================================================================
    // Lifecycle
    // =================================================================

    /// Terminal transition after the book's pair has been settled.
    pub fn mark_cleared(&mut self) -> Result<()> {
        if !self.sealed {
            return Err(ClearbatchError::BatchNotSealed);
        }
        if self.cleared {
            return Err(ClearbatchError::AlreadyCleared);
        }
        self.cleared = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clearbatch_types::Asset;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn pair() -> AssetPair {
        AssetPair::new(Asset::test_issued("A0"), Asset::test_issued("A1")).unwrap()
    }

    fn sealed_book(offers: Vec<IocOffer>) -> IocOrderbook {
        let mut book = IocOrderbook::new(pair());
        for offer in offers {
            book.add_offer(offer).unwrap();
        }
        book.seal().unwrap();
        book
    }

    #[test]
    fn empty_book_has_zero_stats() {
        let book = sealed_book(vec![]);
        assert_eq!(book.price_comp_stats(1, 1).unwrap(), PriceCompStats::zero());
        assert_eq!(book.precomputed_table().len(), 1);
        assert_eq!(book.cumulative_offered_for_sale_times_price(5, 3, 4).unwrap(), 0);
    }

    #[test]
    fn one_offer_stats() {
        let amount = 10_000;
        let book = sealed_book(vec![IocOffer::dummy(amount, 100, 100, 1)]);

        let stats = book.price_comp_stats(1, 1).unwrap();
        assert_eq!(stats.cumulative_offered_for_sale, i128::from(amount));
        assert_eq!(stats.cumulative_offered_times_price, i128::from(amount) << 32);

        assert_eq!(book.price_comp_stats(0, 1).unwrap(), PriceCompStats::zero());
        assert_eq!(
            book.price_comp_stats(100, 1).unwrap().cumulative_offered_for_sale,
            i128::from(amount)
        );
        assert_eq!(book.price_comp_stats(1, 100).unwrap(), PriceCompStats::zero());
    }

    #[test]
    fn queries_require_seal() {
        let book = IocOrderbook::new(pair());
        assert!(matches!(
            book.price_comp_stats(1, 1),
            Err(ClearbatchError::BatchNotSealed)
        ));
    }

    #[test]
    fn no_mutation_after_seal_or_clear() {
        let mut book = sealed_book(vec![IocOffer::dummy(5, 1, 1, 1)]);
        assert!(matches!(
            book.add_offer(IocOffer::dummy(5, 1, 1, 2)),
            Err(ClearbatchError::BatchAlreadySealed)
        ));
        assert!(book.seal().is_err());
        book.mark_cleared().unwrap();
        assert!(book.is_cleared());
        assert!(matches!(book.mark_cleared(), Err(ClearbatchError::AlreadyCleared)));
        assert!(matches!(
            book.add_offer(IocOffer::dummy(5, 1, 1, 3)),
            Err(ClearbatchError::AlreadyCleared)
        ));
    }

    #[test]
    fn commit_child_merges_and_checks_pair() {
        let mut parent = IocOrderbook::new(pair());
        parent.add_offer(IocOffer::dummy(5, 1, 1, 1)).unwrap();
        let mut child = IocOrderbook::new(pair());
        child.add_offer(IocOffer::dummy(5, 1, 1, 1)).unwrap();
        child.add_offer(IocOffer::dummy(7, 2, 1, 2)).unwrap();
        parent.commit_child(&child).unwrap();
        // The duplicate collapses under set union.
        assert_eq!(parent.len(), 2);

        let other = IocOrderbook::new(pair().reverse());
        assert!(matches!(
            parent.commit_child(&other),
            Err(ClearbatchError::PairMismatch { .. })
        ));
    }

    #[test]
    fn table_groups_equal_prices() {
        let book = sealed_book(vec![
            IocOffer::dummy(10, 1, 2, 1),
            IocOffer::dummy(20, 2, 4, 2),
            IocOffer::dummy(30, 1, 1, 3),
        ]);
        let table = book.precomputed_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table[1].cumulative_offered_for_sale, 30);
        assert_eq!(table[2].cumulative_offered_for_sale, 60);
    }

    #[test]
    fn table_is_monotone_and_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let offers: Vec<IocOffer> = (0..300)
            .map(|seq| {
                IocOffer::dummy(
                    rng.gen_range(1..1_000_000),
                    rng.gen_range(1..500),
                    rng.gen_range(1..500),
                    seq,
                )
            })
            .collect();
        let book = sealed_book(offers.clone());

        let table = book.precomputed_table();
        for w in table.windows(2) {
            assert!(w[0].marginal_price < w[1].marginal_price);
            assert!(w[0].cumulative_offered_for_sale <= w[1].cumulative_offered_for_sale);
            assert!(w[0].cumulative_offered_times_price <= w[1].cumulative_offered_times_price);
        }

        for _ in 0..500 {
            let sell: u64 = rng.gen_range(1..1_000);
            let buy: u64 = rng.gen_range(1..1_000);
            let stats = book.price_comp_stats(sell, buy).unwrap();
            let in_money = offers.iter().filter(|o| o.min_price.lte_ratio(sell, buy));
            let amount: i128 = in_money.clone().map(|o| i128::from(o.sell_amount)).sum();
            let times_price: i128 = in_money
                .map(|o| offered_times_price(o.sell_amount, o.min_price))
                .sum();
            assert_eq!(stats.cumulative_offered_for_sale, amount);
            assert_eq!(stats.cumulative_offered_times_price, times_price);
        }
    }

    #[test]
    fn smoothing_band_executes_fractionally() {
        // Limit 3; prices 400/100 give ratio 4.
        let amount: i64 = 10_000;
        let book = sealed_book(vec![IocOffer::dummy(amount, 300, 100, 1)]);
        let amt = i128::from(amount);

        assert_eq!(
            book.cumulative_offered_for_sale_times_price(400, 100, 0).unwrap(),
            400 * amt
        );
        // Smoothed price 200 falls below the limit: half the band remains.
        assert_eq!(
            book.cumulative_offered_for_sale_times_price(400, 100, 1).unwrap(),
            200 * amt
        );
        // Exactly at the limit nothing is sold in the band.
        assert_eq!(
            book.cumulative_offered_for_sale_times_price(300, 100, 1).unwrap(),
            0
        );
        // Far in the money: full execution even with smoothing.
        assert_eq!(
            book.cumulative_offered_for_sale_times_price(1000, 100, 1).unwrap(),
            1000 * amt
        );
    }

    #[test]
    fn demand_is_monotone_in_sell_price() {
        let book = sealed_book(
            (0..20)
                .map(|i| IocOffer::dummy(1_000, 90 + i, 100, u64::from(i)))
                .collect(),
        );
        let mut last = 0;
        for sell in (80..130).map(|p| p * 1_000_000u64) {
            let v = book
                .cumulative_offered_for_sale_times_price(sell, 100_000_000, 5)
                .unwrap();
            assert!(v >= last, "not monotone at {sell}");
            last = v;
        }
    }

    #[test]
    fn smooth_mult_shrinks_price() {
        assert_eq!(apply_smooth_mult(1024, 0), 1024);
        assert_eq!(apply_smooth_mult(1024, 1), 512);
        assert_eq!(apply_smooth_mult(1024, 2), 768);
        assert_eq!(apply_smooth_mult(7, 70), 7);
    }
}

//! Per-pair clearing target.
//!
//! A target is the flow (sell-amount x sell-price units) one asset pair
//! must realize this batch. Offers are cleared against it in price order,
//! and whatever they leave over is sold into the pair's pool.
//!
//! Rounding favors the market: a seller gives up `ceil(value / sell_price)`
//! and a buyer receives `floor(value / buy_price)`. The pool's leg is the
//! one exception: when that rounding would shrink the pool's constant
//! product, the leg concedes a unit to the pool on one side (or both) in
//! the first combination the exact check accepts.

use clearbatch_pricing::{LiquidityPoolBackend, LiquidityPoolFrame};
use clearbatch_types::{
    AssetPair, ClearbatchError, IocOffer, LedgerState, OfferClearingStatus, PoolClearingStatus, Result,
};

/// Execution plan and running totals for one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearingTarget {
    pair: AssetPair,
    sell_price: u64,
    buy_price: u64,
    total_clear_target: i128,
    realized_clear_target: i128,
    realized_sell_amount: i64,
    realized_buy_amount: i64,
}

impl ClearingTarget {
    pub fn new(pair: AssetPair, sell_price: u64, buy_price: u64, total_clear_target: i128) -> Result<Self> {
        if sell_price == 0 || buy_price == 0 {
            return Err(ClearbatchError::InvalidAmount {
                reason: format!("zero clearing price on {pair}"),
            });
        }
        if total_clear_target < 0 {
            return Err(ClearbatchError::InvalidAmount {
                reason: format!("negative clearing target {total_clear_target} on {pair}"),
            });
        }
        Ok(Self {
            pair,
            sell_price,
            buy_price,
            total_clear_target,
            realized_clear_target: 0,
            realized_sell_amount: 0,
            realized_buy_amount: 0,
        })
    }

    #[must_use]
    pub fn pair(&self) -> &AssetPair {
        &self.pair
    }

    #[must_use]
    pub fn sell_price(&self) -> u64 {
        self.sell_price
    }

    #[must_use]
    pub fn buy_price(&self) -> u64 {
        self.buy_price
    }

    #[must_use]
    pub fn total_clear_target(&self) -> i128 {
        self.total_clear_target
    }

    #[must_use]
    pub fn realized_clear_target(&self) -> i128 {
        self.realized_clear_target
    }

    #[must_use]
    pub fn realized_sell_amount(&self) -> i64 {
        self.realized_sell_amount
    }

    #[must_use]
    pub fn realized_buy_amount(&self) -> i64 {
        self.realized_buy_amount
    }

    #[must_use]
    pub fn remaining(&self) -> i128 {
        self.total_clear_target - self.realized_clear_target
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.realized_clear_target == self.total_clear_target
    }

    /// Whether the offer's limit is at or below `sell_price / buy_price`.
    #[must_use]
    pub fn is_compatible(&self, offer: &IocOffer) -> bool {
        offer.min_price.lte_ratio(self.sell_price, self.buy_price)
    }

    fn units(&self, value: i128, price: u64, round_up: bool) -> Result<i64> {
        let price = i128::from(price);
        let amount = value / price + i128::from(round_up && value % price != 0);
        i64::try_from(amount).map_err(|_| ClearbatchError::InvalidAmount {
            reason: format!("amount {amount} out of range on {}", self.pair),
        })
    }

    fn sell_amount(&self, value: i128) -> Result<i64> {
        self.units(value, self.sell_price, true)
    }

    fn buy_amount(&self, value: i128) -> Result<i64> {
        self.units(value, self.buy_price, false)
    }

    /// (sell, buy) amounts for the pool's leg.
    fn pool_leg_amounts<P: LiquidityPoolBackend + ?Sized>(
        &self,
        frame: &LiquidityPoolFrame<'_, P>,
        value: i128,
    ) -> Result<(i64, i64)> {
        let sell_up = self.sell_amount(value)?;
        let buy_down = self.buy_amount(value)?;
        let market_favoring = frame.assert_valid_trade(sell_up, buy_down, self.sell_price, self.buy_price);
        if market_favoring.is_ok() {
            return Ok((sell_up, buy_down));
        }

        let sell_down = self.units(value, self.sell_price, false)?;
        let buy_up = self.units(value, self.buy_price, true)?;
        for (sell, buy) in [(sell_down, buy_down), (sell_up, buy_up), (sell_down, buy_up)] {
            if (sell, buy) == (sell_up, buy_down) {
                continue;
            }
            if frame
                .assert_valid_trade(sell, buy, self.sell_price, self.buy_price)
                .is_ok()
            {
                tracing::debug!(
                    pair = %self.pair,
                    sell_amount = sell,
                    buy_amount = buy,
                    "Pool leg rounded toward the pool"
                );
                return Ok((sell, buy));
            }
        }
        market_favoring.map(|()| (sell_up, buy_down))
    }

    fn record(&mut self, value: i128, sell_amount: i64, buy_amount: i64) -> Result<()> {
        let overflow = || ClearbatchError::InvalidAmount {
            reason: format!("realized amounts overflow on {}", self.pair),
        };
        let sell = self.realized_sell_amount.checked_add(sell_amount).ok_or_else(overflow)?;
        let buy = self.realized_buy_amount.checked_add(buy_amount).ok_or_else(overflow)?;
        self.realized_sell_amount = sell;
        self.realized_buy_amount = buy;
        self.realized_clear_target += value;
        Ok(())
    }

    // =================================================================
    // Clearing
    // =================================================================

    /// Execute as much of `offer` as the remaining target allows.
    ///
    /// Credits the offer's account with what it bought and debits what it
    /// sold. An offer priced above the clearing ratio is an invariant
    /// violation, not a skip.
    pub fn clear_offer(
        &mut self,
        ledger: &mut dyn LedgerState,
        offer: &IocOffer,
    ) -> Result<OfferClearingStatus> {
        if !self.is_compatible(offer) {
            tracing::warn!(
                pair = %self.pair,
                min_price = %offer.min_price,
                sell_price = self.sell_price,
                buy_price = self.buy_price,
                "Offer priced above clearing ratio"
            );
            return Err(ClearbatchError::IncompatibleOfferPrice(self.pair.clone()));
        }

        let offered = i128::from(offer.sell_amount) * i128::from(self.sell_price);
        let value = self.remaining().min(offered);
        let sell_amount = self.sell_amount(value)?;
        let buy_amount = self.buy_amount(value)?;

        ledger.add_balance(&offer.source_account, &self.pair.buying, buy_amount)?;
        ledger.add_balance(&offer.source_account, &self.pair.selling, -sell_amount)?;
        self.record(value, sell_amount, buy_amount)?;

        Ok(OfferClearingStatus {
            source_account: offer.source_account,
            seq_num: offer.source_seq_num,
            offer_index: offer.op_index,
            pair: self.pair.clone(),
            sold_amount: sell_amount,
            bought_amount: buy_amount,
        })
    }

    /// Sell whatever the offers left over into the pair's pool.
    ///
    /// The trade is re-validated against the pool's advertised liquidity
    /// and its fee-adjusted constant product before any reserve moves.
    pub fn finish_with_liquidity_pool<P: LiquidityPoolBackend + ?Sized>(
        &mut self,
        pool: &mut P,
    ) -> Result<PoolClearingStatus> {
        let value = self.remaining();
        let (sell_amount, buy_amount, (delta_a, delta_b)) = {
            let frame = LiquidityPoolFrame::new(&*pool, &self.pair);
            let (sell_amount, buy_amount) = self.pool_leg_amounts(&frame, value)?;
            (sell_amount, buy_amount, frame.transfer_deltas(sell_amount, buy_amount))
        };
        pool.transfer(delta_a, delta_b)?;
        self.record(value, sell_amount, buy_amount)?;

        tracing::debug!(
            pair = %self.pair,
            pool = %pool.pool_id(),
            sell_amount,
            buy_amount,
            "Residual sold into pool"
        );

        Ok(PoolClearingStatus {
            pool_id: pool.pool_id(),
            sold_asset: self.pair.selling.clone(),
            bought_asset: self.pair.buying.clone(),
            sold_amount: sell_amount,
            bought_amount: buy_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use clearbatch_pricing::SimulatedPool;
    use clearbatch_types::{AccountId, Asset, PoolId};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::memory_ledger::InMemoryLedger;

    fn pair() -> AssetPair {
        AssetPair::new(Asset::test_issued("A0"), Asset::test_issued("A1")).unwrap()
    }

    fn funded(account: AccountId, amount: i64) -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        ledger.deposit(account, &pair().selling, amount).unwrap();
        ledger
    }

    #[test]
    fn full_fill_rounds_toward_market() {
        let account = AccountId::test_account(1);
        let mut ledger = funded(account, 1_000);
        let offer = IocOffer::dummy_for(account, 1_000, 1, 1, 1);

        // Target covers the whole offer at 7:3.
        let mut target = ClearingTarget::new(pair(), 7, 3, 1_000_000).unwrap();
        let status = target.clear_offer(&mut ledger, &offer).unwrap();

        assert_eq!(status.sold_amount, 1_000);
        assert_eq!(status.bought_amount, 7_000 / 3);
        assert_eq!(ledger.balance(&account, &pair().selling), 0);
        assert_eq!(ledger.balance(&account, &pair().buying), 2_333);
        assert_eq!(target.realized_clear_target(), 7_000);
        assert!(!target.is_done());
    }

    #[test]
    fn partial_fill_stops_at_target() {
        let account = AccountId::test_account(1);
        let mut ledger = funded(account, 1_000);
        let offer = IocOffer::dummy_for(account, 1_000, 1, 1, 1);

        let mut target = ClearingTarget::new(pair(), 3, 2, 1_000).unwrap();
        let status = target.clear_offer(&mut ledger, &offer).unwrap();

        // ceil(1000 / 3) sold, floor(1000 / 2) bought.
        assert_eq!(status.sold_amount, 334);
        assert_eq!(status.bought_amount, 500);
        assert!(target.is_done());
        assert_eq!(target.realized_sell_amount(), 334);
    }

    #[test]
    fn full_fill_property() {
        let mut rng = StdRng::seed_from_u64(0xc1ea);
        let account = AccountId::test_account(1);
        for _ in 0..500 {
            let amount: i64 = rng.gen_range(1..1_000_000_000);
            let sell_price: u64 = rng.gen_range(1 << 10..1 << 40);
            let buy_price: u64 = rng.gen_range(1 << 10..1 << 40);
            let value = i128::from(amount) * i128::from(sell_price);
            let slack: i128 = rng.gen_range(0..1_000);

            let mut ledger = funded(account, amount);
            let mut target = ClearingTarget::new(pair(), sell_price, buy_price, value + slack).unwrap();
            let offer = IocOffer::dummy_for(account, amount, 1, u32::MAX >> 1, 1);
            let status = target.clear_offer(&mut ledger, &offer).unwrap();

            assert_eq!(status.sold_amount, amount);
            assert_eq!(i128::from(status.bought_amount), value / i128::from(buy_price));
            assert_eq!(target.remaining(), slack);
        }
    }

    #[test]
    fn offer_at_exact_ratio_is_compatible() {
        let account = AccountId::test_account(1);
        let mut ledger = funded(account, 10);
        let mut target = ClearingTarget::new(pair(), 3, 2, 30).unwrap();
        let at_limit = IocOffer::dummy_for(account, 10, 3, 2, 1);
        assert!(target.is_compatible(&at_limit));
        target.clear_offer(&mut ledger, &at_limit).unwrap();
        assert!(target.is_done());
    }

    #[test]
    fn incompatible_offer_is_fatal() {
        let account = AccountId::test_account(1);
        let mut ledger = funded(account, 1_000);
        let offer = IocOffer::dummy_for(account, 1_000, 2, 1, 1);
        let mut target = ClearingTarget::new(pair(), 1, 1, 1_000).unwrap();
        assert!(matches!(
            target.clear_offer(&mut ledger, &offer),
            Err(ClearbatchError::IncompatibleOfferPrice(_))
        ));
        assert_eq!(ledger.balance(&account, &pair().selling), 1_000);
    }

    #[test]
    fn unfunded_offer_fails() {
        let account = AccountId::test_account(1);
        let mut ledger = InMemoryLedger::new();
        let offer = IocOffer::dummy_for(account, 1_000, 1, 1, 1);
        let mut target = ClearingTarget::new(pair(), 1, 1, 1_000).unwrap();
        assert!(matches!(
            target.clear_offer(&mut ledger, &offer),
            Err(ClearbatchError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn residual_goes_to_pool() {
        let (a0, a1) = (pair().selling, pair().buying);
        let mut pool = SimulatedPool::new(PoolId::for_assets(&a0, &a1), 1_000_000, 1_000_000, 30);

        // A0 at 1.25x A1: the pool sells A0.
        let mut target = ClearingTarget::new(pair(), 125, 100, 13_000_000).unwrap();
        let status = target.finish_with_liquidity_pool(&mut pool).unwrap();

        assert!(target.is_done());
        assert_eq!(status.sold_amount, 104_000);
        assert_eq!(status.bought_amount, 130_000);
        assert_eq!(pool.reserves(), (896_000, 1_130_000));
        assert_eq!(status.sold_asset, a0);
    }

    #[test]
    fn pool_refuses_more_than_it_offers() {
        let (a0, a1) = (pair().selling, pair().buying);
        let mut pool = SimulatedPool::new(PoolId::for_assets(&a0, &a1), 1_000_000, 1_000_000, 30);
        let mut target = ClearingTarget::new(pair(), 125, 100, 14_000_000).unwrap();
        assert!(target.finish_with_liquidity_pool(&mut pool).is_err());
        assert_eq!(pool.reserves(), (1_000_000, 1_000_000));
    }

    fn residual_into(
        reserves: (i64, i64),
        sell_price: u64,
        buy_price: u64,
        value: i128,
    ) -> (PoolClearingStatus, (i64, i64)) {
        let (a0, a1) = (pair().selling, pair().buying);
        let mut pool = SimulatedPool::new(PoolId::for_assets(&a0, &a1), reserves.0, reserves.1, 30);
        let mut target = ClearingTarget::new(pair(), sell_price, buy_price, value).unwrap();
        let status = target.finish_with_liquidity_pool(&mut pool).unwrap();
        assert!(target.is_done());
        (status, pool.reserves())
    }

    #[test]
    fn pool_leg_concedes_rounding_near_marginal_price() {
        // ceil/floor would sell 290 for 236 and shrink the product.
        let (status, reserves) = residual_into((8_562_791, 6_967_029), 816_200, 1_000_000, 236_539_809);
        assert_eq!((status.sold_amount, status.bought_amount), (289, 236));
        assert_eq!(reserves, (8_562_502, 6_967_265));

        // ceil/floor would sell 766 for 650.
        let (status, reserves) = residual_into(
            (9_034_246, 7_644_754),
            3_957_170_938,
            4_657_769_214,
            3_027_549_989_100,
        );
        assert_eq!((status.sold_amount, status.bought_amount), (765, 650));
        assert_eq!(reserves, (9_033_481, 7_645_404));
    }

    #[test]
    fn pool_clears_full_advertised_value() {
        let (a0, a1) = (pair().selling, pair().buying);
        let backend = SimulatedPool::new(PoolId::for_assets(&a0, &a1), 9_034_246, 7_644_754, 30);
        let (sell_price, buy_price) = (3_957_170_938, 4_657_769_214);
        let p = pair();
        let advertised =
            LiquidityPoolFrame::new(&backend, &p).amount_offered_for_sale_times_sell_price(sell_price, buy_price);
        assert_eq!(advertised, 17_681_698_938_148);

        let (status, _) = residual_into((9_034_246, 7_644_754), sell_price, buy_price, advertised);
        assert_eq!((status.sold_amount, status.bought_amount), (4_469, 3_796));
    }

    #[test]
    fn rejects_bad_targets() {
        assert!(ClearingTarget::new(pair(), 0, 1, 1).is_err());
        assert!(ClearingTarget::new(pair(), 1, 1, -1).is_err());
    }
}

//! Constant-product pool pricing, seen from one trading direction.
//!
//! A [`LiquidityPoolBackend`] owns the two reserves (asset A is always the
//! canonically lower asset) and the fee. A [`LiquidityPoolFrame`] views a
//! backend from one [`AssetPair`] and answers "how much would the pool sell
//! at these prices" with integer square roots only.
//!
//! Rounding rule: every approximation rounds toward offering *less*
//! liquidity, never more than the pool can deliver. Clearing then rounds
//! the pool's sell amount up and its buy amount down; the advertised value
//! is capped where a trade rounded both ways still keeps the invariant.

use clearbatch_types::constants::FEE_DENOMINATOR;
use clearbatch_types::{AssetPair, ClearbatchError, LedgerState, PoolEntry, PoolId, Result};

use crate::wide::{self, U512};

/// Capability interface over a pool's storage.
pub trait LiquidityPoolBackend {
    /// Reserves of (asset A, asset B).
    fn reserves(&self) -> (i64, i64);

    /// Fee in parts per [`FEE_DENOMINATOR`].
    fn fee(&self) -> u32;

    fn pool_id(&self) -> PoolId;

    /// Apply reserve deltas for a trade.
    fn transfer(&mut self, delta_a: i64, delta_b: i64) -> Result<()>;

    /// Persist the pool's state, if it is backed by the ledger.
    fn flush(&self, ledger: &mut dyn LedgerState) -> Result<()>;
}

fn apply_deltas(reserves: (i64, i64), delta_a: i64, delta_b: i64) -> Result<(i64, i64)> {
    let a = reserves.0.checked_add(delta_a);
    let b = reserves.1.checked_add(delta_b);
    match (a, b) {
        (Some(a), Some(b)) if a >= 0 && b >= 0 => Ok((a, b)),
        _ => Err(ClearbatchError::PoolInvariantViolation {
            reason: format!(
                "reserves {reserves:?} cannot absorb deltas ({delta_a}, {delta_b})"
            ),
        }),
    }
}

// ---------------------------------------------------------------------------
// Ledger-backed pool
// ---------------------------------------------------------------------------

/// Pool loaded from the ledger once per round and written back after clearing.
#[derive(Debug, Clone)]
pub struct LedgerPool {
    entry: PoolEntry,
    dirty: bool,
}

impl LedgerPool {
    #[must_use]
    pub fn new(entry: PoolEntry) -> Self {
        Self { entry, dirty: false }
    }

    #[must_use]
    pub fn entry(&self) -> &PoolEntry {
        &self.entry
    }
}

impl LiquidityPoolBackend for LedgerPool {
    fn reserves(&self) -> (i64, i64) {
        (self.entry.reserve_a, self.entry.reserve_b)
    }

    fn fee(&self) -> u32 {
        self.entry.fee
    }

    fn pool_id(&self) -> PoolId {
        self.entry.pool_id
    }

    fn transfer(&mut self, delta_a: i64, delta_b: i64) -> Result<()> {
        let (a, b) = apply_deltas(self.reserves(), delta_a, delta_b)?;
        self.entry.reserve_a = a;
        self.entry.reserve_b = b;
        self.dirty = true;
        Ok(())
    }

    fn flush(&self, ledger: &mut dyn LedgerState) -> Result<()> {
        if self.dirty {
            ledger.store_pool(self.entry.clone())?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Simulated pool
// ---------------------------------------------------------------------------

/// In-memory pool for simulation and tests; never touches the ledger.
#[derive(Debug, Clone)]
pub struct SimulatedPool {
    pool_id: PoolId,
    reserve_a: i64,
    reserve_b: i64,
    fee: u32,
}

impl SimulatedPool {
    #[must_use]
    pub fn new(pool_id: PoolId, reserve_a: i64, reserve_b: i64, fee: u32) -> Self {
        Self {
            pool_id,
            reserve_a,
            reserve_b,
            fee,
        }
    }
}

impl LiquidityPoolBackend for SimulatedPool {
    fn reserves(&self) -> (i64, i64) {
        (self.reserve_a, self.reserve_b)
    }

    fn fee(&self) -> u32 {
        self.fee
    }

    fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    fn transfer(&mut self, delta_a: i64, delta_b: i64) -> Result<()> {
        let (a, b) = apply_deltas(self.reserves(), delta_a, delta_b)?;
        self.reserve_a = a;
        self.reserve_b = b;
        Ok(())
    }

    fn flush(&self, _ledger: &mut dyn LedgerState) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Integer square roots
// ---------------------------------------------------------------------------

#[must_use]
pub fn isqrt_floor(v: u128) -> u128 {
    v.isqrt()
}

#[must_use]
pub fn isqrt_ceil(v: u128) -> u128 {
    let root = v.isqrt();
    if root * root < v { root + 1 } else { root }
}

fn non_negative(v: i64) -> u128 {
    u128::try_from(v).unwrap_or(0)
}

/// The worst-case rounded trade check, in 512 bits.
struct WorstCaseTrade {
    /// `sell_price * (x - 1)`
    sell_capacity: U512,
    /// `buy_price * (D*y - (D - fee))`
    buy_base: U512,
    fee_kept: U512,
    /// `sell_price * buy_price * D * x * y`
    product_before: U512,
}

impl WorstCaseTrade {
    fn new(x: u128, y: u128, fee: u32, sell_price: u64, buy_price: u64) -> Option<Self> {
        let denom = u128::from(FEE_DENOMINATOR);
        let fee_kept = denom - u128::from(fee).min(denom);
        if x == 0 || y == 0 {
            return None;
        }
        let sell = U512::from(sell_price);
        let buy = U512::from(buy_price);
        Some(Self {
            sell_capacity: sell * U512::from(x - 1),
            buy_base: buy * U512::from(denom * y - fee_kept),
            fee_kept: U512::from(fee_kept),
            product_before: sell * buy * U512::from(denom) * U512::from(x) * U512::from(y),
        })
    }

    fn keeps_invariant(&self, value: u128) -> bool {
        let value = U512::from(value);
        if value > self.sell_capacity {
            return false;
        }
        let after = (self.sell_capacity - value) * (self.buy_base + self.fee_kept * value);
        after >= self.product_before
    }

    /// Argmax of `F`: `(fee_kept*sell_capacity - buy_base) / (2*fee_kept)`,
    /// or `None` when `F` only decreases for positive values.
    fn vertex(&self) -> Option<u128> {
        let rising = self.fee_kept * self.sell_capacity;
        if self.fee_kept.is_zero() || rising <= self.buy_base {
            return None;
        }
        let vertex = (rising - self.buy_base) / (self.fee_kept * U512::from(2u64));
        Some(u128::try_from(vertex).unwrap_or(u128::MAX))
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A pool viewed from the direction of one pair: the pool *sells*
/// `pair.selling` and *buys* `pair.buying`.
#[derive(Debug)]
pub struct LiquidityPoolFrame<'a, P: ?Sized> {
    backend: &'a P,
    pair: &'a AssetPair,
}

impl<'a, P: LiquidityPoolBackend + ?Sized> LiquidityPoolFrame<'a, P> {
    pub fn new(backend: &'a P, pair: &'a AssetPair) -> Self {
        Self { backend, pair }
    }

    #[must_use]
    pub fn pair(&self) -> &AssetPair {
        self.pair
    }

    /// (reserve of the selling asset, reserve of the buying asset).
    #[must_use]
    pub fn sell_buy_reserves(&self) -> (i64, i64) {
        let (a, b) = self.backend.reserves();
        if self.pair.sells_lower_asset() { (a, b) } else { (b, a) }
    }

    /// `amount` minus the fee, rounding the fee down. Zero if the fee eats it.
    #[must_use]
    pub fn subtract_fee(&self, amount: u128) -> u128 {
        let fee = amount * u128::from(self.backend.fee()) / u128::from(FEE_DENOMINATOR);
        amount.saturating_sub(fee)
    }

    /// Fee-adjusted marginal price (`buy_reserve / fee_adjusted_sell_reserve`)
    /// below which the pool sells nothing.
    #[must_use]
    pub fn min_price_ratio(&self) -> (u128, u128) {
        let (sell_reserve, buy_reserve) = self.sell_buy_reserves();
        (non_negative(buy_reserve), self.subtract_fee(non_negative(sell_reserve)))
    }

    /// Value (in `sell_price` units) the pool would sell at these prices:
    /// `sell_price * sqrt(x * x_fee) - sqrt(y * buy_price) * sqrt(x * sell_price)`,
    /// with the first root rounded down and the subtracted roots rounded up,
    /// then capped by [`Self::rounding_safe_value`].
    #[must_use]
    pub fn amount_offered_for_sale_times_sell_price(&self, sell_price: u64, buy_price: u64) -> i128 {
        let curve = self.curve_value(sell_price, buy_price);
        if curve == 0 {
            return 0;
        }
        self.rounding_safe_value(curve, sell_price, buy_price)
    }

    fn curve_value(&self, sell_price: u64, buy_price: u64) -> i128 {
        let (sell_reserve, buy_reserve) = self.sell_buy_reserves();
        let x = non_negative(sell_reserve);
        let y = non_negative(buy_reserve);
        if x == 0 {
            return 0;
        }
        let (price_n, price_d) = self.min_price_ratio();
        if price_d == 0 {
            return 0;
        }
        let sell = u128::from(sell_price);
        let buy = u128::from(buy_price);
        // Offered ratio sell/buy below the marginal ratio: nothing to sell.
        if wide::product(sell, price_d) < wide::product(price_n, buy) {
            return 0;
        }

        let reachable = wide::product(sell, isqrt_floor(x * price_d));
        let consumed = wide::product(isqrt_ceil(y * buy), isqrt_ceil(x * sell));
        if reachable <= consumed {
            return 0;
        }
        let mut offered = reachable;
        wide::subtract_smaller(&mut offered, &consumed);
        wide::saturating_i128(&offered)
    }

    /// Largest value `v <= curve` such that the pool still keeps its
    /// invariant when the trade for `v` is rounded a full unit against it
    /// on both legs: selling `v / sell_price + 1` and receiving
    /// `v / buy_price - 1`.
    ///
    /// ## Algorithm
    ///
    /// With `D` the fee denominator, `X = x - 1` and `Y = D*y - (D - fee)`,
    /// the worst-case trade keeps the invariant iff
    /// `F(v) = (sell_price*X - v) * (buy_price*Y + (D - fee)*v) - sell_price*buy_price*D*x*y >= 0`.
    /// `F` is a concave quadratic, so the valid values form one interval:
    /// 1. If `F(curve) >= 0` the curve value is already safe
    /// 2. Otherwise take the vertex `v*` of `F`; if `F(v*) < 0` nothing is safe
    /// 3. Otherwise binary-search `(v*, curve)` for the interval's upper end
    fn rounding_safe_value(&self, curve: i128, sell_price: u64, buy_price: u64) -> i128 {
        let (sell_reserve, buy_reserve) = self.sell_buy_reserves();
        let x = non_negative(sell_reserve);
        let y = non_negative(buy_reserve);
        let worst_case = WorstCaseTrade::new(x, y, self.backend.fee(), sell_price, buy_price);
        let Some(worst_case) = worst_case else {
            // An empty buy reserve has a zero product to protect.
            return curve;
        };
        let Ok(curve_u) = u128::try_from(curve) else {
            return 0;
        };
        if worst_case.keeps_invariant(curve_u) {
            return curve;
        }
        let Some(vertex) = worst_case.vertex() else {
            return 0;
        };
        let mut lo = vertex.min(curve_u);
        if !worst_case.keeps_invariant(lo) {
            return 0;
        }
        let mut hi = curve_u;
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if worst_case.keeps_invariant(mid) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        i128::try_from(lo).unwrap_or(0)
    }

    /// Units of the selling asset offered at these prices, rounded down.
    #[must_use]
    pub fn amount_offered_for_sale(&self, sell_price: u64, buy_price: u64) -> i64 {
        if sell_price == 0 {
            return 0;
        }
        let value = self.amount_offered_for_sale_times_sell_price(sell_price, buy_price);
        i64::try_from(value / i128::from(sell_price)).unwrap_or(i64::MAX)
    }

    /// The pool may sell at most the ceiling of its curve liquidity at these
    /// prices. The ceiling covers the clearing rule that rounds sell amounts
    /// up; the rounding-safe cap only limits what is advertised.
    pub fn assert_valid_sell_amount(&self, sell_amount: i64, sell_price: u64, buy_price: u64) -> Result<()> {
        if sell_amount < 0 {
            return Err(ClearbatchError::InvalidPoolTrade {
                reason: format!("negative sell amount {sell_amount}"),
            });
        }
        if sell_price == 0 {
            return Err(ClearbatchError::InvalidPoolTrade {
                reason: "zero sell price".to_string(),
            });
        }
        let value = self.curve_value(sell_price, buy_price);
        let sell = i128::from(sell_price);
        let ceiling = value / sell + i128::from(value % sell != 0);
        if i128::from(sell_amount) > ceiling {
            return Err(ClearbatchError::InvalidPoolTrade {
                reason: format!(
                    "pool {} asked to sell {sell_amount} of {}, offers {ceiling}",
                    self.backend.pool_id(),
                    self.pair.selling
                ),
            });
        }
        Ok(())
    }

    /// Selling `sell_amount` for `buy_amount` must not shrink the
    /// fee-adjusted constant product:
    /// `(x - sell) * (D*y + (D - fee)*buy) >= D * x * y`, exactly.
    pub fn assert_valid_trade(
        &self,
        sell_amount: i64,
        buy_amount: i64,
        sell_price: u64,
        buy_price: u64,
    ) -> Result<()> {
        self.assert_valid_sell_amount(sell_amount, sell_price, buy_price)?;
        if buy_amount < 0 {
            return Err(ClearbatchError::InvalidPoolTrade {
                reason: format!("negative buy amount {buy_amount}"),
            });
        }
        let (sell_reserve, buy_reserve) = self.sell_buy_reserves();
        let x = non_negative(sell_reserve);
        let y = non_negative(buy_reserve);
        let sell = non_negative(sell_amount);
        let buy = non_negative(buy_amount);
        if sell > x {
            return Err(ClearbatchError::PoolInvariantViolation {
                reason: format!("sell {sell} exceeds reserve {x}"),
            });
        }

        let denom = u128::from(FEE_DENOMINATOR);
        let fee_kept = denom - u128::from(self.backend.fee()).min(denom);
        let before = wide::product(x * y, denom);
        let after = wide::product(x - sell, denom * y + fee_kept * buy);
        if after < before {
            return Err(ClearbatchError::PoolInvariantViolation {
                reason: format!(
                    "pool {} constant product would shrink: sell {sell} buy {buy} reserves ({x}, {y})",
                    self.backend.pool_id()
                ),
            });
        }
        Ok(())
    }

    /// Reserve deltas (A, B) for the pool selling `sell_amount` and
    /// receiving `buy_amount`.
    #[must_use]
    pub fn transfer_deltas(&self, sell_amount: i64, buy_amount: i64) -> (i64, i64) {
        if self.pair.sells_lower_asset() {
            (-sell_amount, buy_amount)
        } else {
            (buy_amount, -sell_amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use clearbatch_types::Asset;

    use super::*;

    fn pair() -> AssetPair {
        AssetPair::new(Asset::test_issued("A0"), Asset::test_issued("A1")).unwrap()
    }

    fn pool(a: i64, b: i64, fee: u32) -> SimulatedPool {
        let p = pair();
        SimulatedPool::new(PoolId::for_assets(&p.selling, &p.buying), a, b, fee)
    }

    #[test]
    fn integer_square_roots() {
        assert_eq!(isqrt_floor(0), 0);
        assert_eq!(isqrt_ceil(0), 0);
        assert_eq!(isqrt_floor(99), 9);
        assert_eq!(isqrt_ceil(99), 10);
        assert_eq!(isqrt_floor(100), 10);
        assert_eq!(isqrt_ceil(100), 10);
        let big = u128::MAX;
        assert!(isqrt_floor(big) * isqrt_floor(big) <= big);
    }

    #[test]
    fn marginal_price_is_fee_adjusted() {
        let backend = pool(1003, 1000, 30);
        let p = pair();
        let frame = LiquidityPoolFrame::new(&backend, &p);
        assert_eq!(frame.min_price_ratio(), (1000, 1000));
    }

    #[test]
    fn frames_orient_reserves() {
        let backend = pool(10, 20, 0);
        let p = pair();
        let rev = p.reverse();
        assert_eq!(LiquidityPoolFrame::new(&backend, &p).sell_buy_reserves(), (10, 20));
        assert_eq!(LiquidityPoolFrame::new(&backend, &rev).sell_buy_reserves(), (20, 10));
        assert_eq!(LiquidityPoolFrame::new(&backend, &p).transfer_deltas(3, 4), (-3, 4));
        assert_eq!(LiquidityPoolFrame::new(&backend, &rev).transfer_deltas(3, 4), (4, -3));
    }

    #[test]
    fn offered_liquidity_never_exceeds_exact_curve() {
        let backend = pool(1000, 1000, 0);
        let p = pair();
        let frame = LiquidityPoolFrame::new(&backend, &p);

        assert_eq!(frame.amount_offered_for_sale_times_sell_price(25, 1), 19_912);
        assert!(frame.amount_offered_for_sale_times_sell_price(25, 1) <= 25 * 800);
        assert_eq!(frame.amount_offered_for_sale_times_sell_price(1, 100), 0);
        assert!(frame.amount_offered_for_sale_times_sell_price(100, 1) <= 100 * 900);
        assert!(frame.amount_offered_for_sale_times_sell_price(10_000, 100) <= 10_000 * 900);
        assert_eq!(frame.amount_offered_for_sale(25, 1), 796);
    }

    #[test]
    fn advertised_liquidity_leaves_room_for_rounding() {
        let p = pair();

        // Near the marginal price no value survives a unit of rounding.
        let tight = pool(8_562_791, 6_967_029, 30);
        let frame = LiquidityPoolFrame::new(&tight, &p);
        assert_eq!(frame.curve_value(816_200, 1_000_000), 473_079_618);
        assert_eq!(frame.amount_offered_for_sale_times_sell_price(816_200, 1_000_000), 0);

        let wide_pool = pool(9_034_246, 7_644_754, 30);
        let frame = LiquidityPoolFrame::new(&wide_pool, &p);
        let (sell_price, buy_price) = (3_957_170_938, 4_657_769_214);
        let value = frame.amount_offered_for_sale_times_sell_price(sell_price, buy_price);
        assert_eq!(value, 17_681_698_938_148);
        frame.assert_valid_trade(4_469, 3_796, sell_price, buy_price).unwrap();

        let deep = pool(1_000_000, 1_000_000, 30);
        let frame = LiquidityPoolFrame::new(&deep, &p);
        assert_eq!(frame.amount_offered_for_sale_times_sell_price(125, 100), 13_002_250);
    }

    #[test]
    fn empty_pool_offers_nothing() {
        let backend = pool(0, 1000, 30);
        let p = pair();
        let frame = LiquidityPoolFrame::new(&backend, &p);
        assert_eq!(frame.amount_offered_for_sale_times_sell_price(100, 1), 0);
    }

    #[test]
    fn valid_trade_keeps_constant_product() {
        let mut backend = pool(1_000_000, 1_000_000, 30);
        let p = pair();
        let (sell, buy) = {
            let frame = LiquidityPoolFrame::new(&backend, &p);
            // At 1.25 the pool sells roughly 10% of its reserve.
            let offered = frame.amount_offered_for_sale(125, 100);
            assert!(offered > 0);
            let sell = offered;
            let buy = (i128::from(sell) * 125 / 100) as i64;
            frame.assert_valid_trade(sell, buy, 125, 100).unwrap();
            (sell, buy)
        };
        let deltas = LiquidityPoolFrame::new(&backend, &p).transfer_deltas(sell, buy);
        backend.transfer(deltas.0, deltas.1).unwrap();
        let (a, b) = backend.reserves();
        assert!(i128::from(a) * i128::from(b) >= 1_000_000i128 * 1_000_000);
    }

    #[test]
    fn rejects_trades_that_shrink_k() {
        let backend = pool(1_000_000, 1_000_000, 30);
        let p = pair();
        let frame = LiquidityPoolFrame::new(&backend, &p);
        let offered = frame.amount_offered_for_sale(125, 100);
        // Same sale for nothing in return.
        assert!(matches!(
            frame.assert_valid_trade(offered, 0, 125, 100),
            Err(ClearbatchError::PoolInvariantViolation { .. })
        ));
        // More than offered.
        assert!(matches!(
            frame.assert_valid_sell_amount(offered + 10, 125, 100),
            Err(ClearbatchError::InvalidPoolTrade { .. })
        ));
        assert!(frame.assert_valid_sell_amount(-1, 125, 100).is_err());
    }

    #[test]
    fn ledger_pool_flushes_only_when_dirty() {
        struct Recorder(Vec<PoolEntry>);
        impl LedgerState for Recorder {
            fn add_balance(&mut self, _: &clearbatch_types::AccountId, _: &Asset, _: i64) -> Result<()> {
                Ok(())
            }
            fn add_to_fee_pool(&mut self, _: i64) -> Result<()> {
                Ok(())
            }
            fn load_pool(&self, _: &Asset, _: &Asset) -> Option<PoolEntry> {
                None
            }
            fn store_pool(&mut self, entry: PoolEntry) -> Result<()> {
                self.0.push(entry);
                Ok(())
            }
        }

        let p = pair();
        let mut pool = LedgerPool::new(PoolEntry::new(p.selling.clone(), p.buying.clone(), 100, 100, 30));
        let mut ledger = Recorder(Vec::new());
        pool.flush(&mut ledger).unwrap();
        assert!(ledger.0.is_empty());

        pool.transfer(-10, 12).unwrap();
        pool.flush(&mut ledger).unwrap();
        assert_eq!(ledger.0.len(), 1);
        assert_eq!((ledger.0[0].reserve_a, ledger.0[0].reserve_b), (90, 112));

        assert!(pool.transfer(-1000, 0).is_err());
    }
}

//! Aggregate supply and demand, and the price-search objective.

use std::collections::BTreeMap;

use clearbatch_types::{Asset, AssetPair};

use crate::wide::{self, U256};

/// Per-asset (supply, demand) accumulators for one price query.
///
/// Amounts are values in price units: a pair's flow counts as supply of
/// the selling asset and demand for the buying asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplyDemand {
    entries: BTreeMap<Asset, (i128, i128)>,
    tax_rate: u8,
}

impl SupplyDemand {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator applying the reserved buyer-side tax shift.
    ///
    /// With `tax_rate > 0` the buyer is credited `amount - (amount >> tax_rate)`
    /// instead of `amount`.
    #[must_use]
    pub fn with_tax_rate(tax_rate: u8) -> Self {
        Self {
            entries: BTreeMap::new(),
            tax_rate,
        }
    }

    pub fn add_supply_demand(&mut self, pair: &AssetPair, amount: i128) {
        let demanded = if self.tax_rate == 0 {
            amount
        } else {
            amount - amount.checked_shr(u32::from(self.tax_rate)).unwrap_or(0)
        };
        let selling = self.entries.entry(pair.selling.clone()).or_default();
        selling.0 = selling.0.saturating_add(amount);
        let buying = self.entries.entry(pair.buying.clone()).or_default();
        buying.1 = buying.1.saturating_add(demanded);
    }

    /// `demand - supply`; 0 for assets nothing touched.
    #[must_use]
    pub fn delta(&self, asset: &Asset) -> i128 {
        self.entries
            .get(asset)
            .map_or(0, |(supply, demand)| demand.saturating_sub(*supply))
    }

    #[must_use]
    pub fn supply(&self, asset: &Asset) -> i128 {
        self.entries.get(asset).map_or(0, |(supply, _)| *supply)
    }

    #[must_use]
    pub fn demand(&self, asset: &Asset) -> i128 {
        self.entries.get(asset).map_or(0, |(_, demand)| *demand)
    }

    /// Sum of squared deltas over every touched asset.
    #[must_use]
    pub fn objective(&self) -> TatonnementObjective {
        let mut total = U256::ZERO;
        for asset in self.entries.keys() {
            total = total.saturating_add(wide::square(self.delta(asset)));
        }
        TatonnementObjective(total)
    }
}

/// Sum of squared excess demands; lower is better.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TatonnementObjective(pub U256);

impl TatonnementObjective {
    /// `self <= other * (1 + tol_num / tol_den)`.
    ///
    /// Only the tolerance term is divided, so no precision is lost on the
    /// objectives themselves. A zero denominator means no tolerance.
    #[must_use]
    pub fn is_better_than(&self, other: &Self, tol_num: u8, tol_den: u8) -> bool {
        if self.0 <= other.0 {
            return true;
        }
        if tol_den == 0 {
            return false;
        }
        let mut diff = self.0;
        wide::subtract_smaller(&mut diff, &other.0);
        let allowance = (other.0 / U256::from(tol_den)).saturating_mul(U256::from(tol_num));
        diff <= allowance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> AssetPair {
        AssetPair::new(Asset::test_issued("A0"), Asset::test_issued("A1")).unwrap()
    }

    #[test]
    fn flow_is_supply_for_seller_demand_for_buyer() {
        let mut sd = SupplyDemand::new();
        sd.add_supply_demand(&pair(), 500);
        sd.add_supply_demand(&pair().reverse(), 200);
        assert_eq!(sd.supply(&pair().selling), 500);
        assert_eq!(sd.demand(&pair().selling), 200);
        assert_eq!(sd.delta(&pair().selling), -300);
        assert_eq!(sd.delta(&pair().buying), 300);
        assert_eq!(sd.delta(&Asset::Native), 0);
    }

    #[test]
    fn objective_sums_squares() {
        let mut sd = SupplyDemand::new();
        sd.add_supply_demand(&pair(), 3);
        // deltas: -3 and +3.
        assert_eq!(sd.objective().0, U256::from(18u64));
    }

    #[test]
    fn tax_only_touches_demand() {
        let mut sd = SupplyDemand::with_tax_rate(2);
        sd.add_supply_demand(&pair(), 400);
        assert_eq!(sd.supply(&pair().selling), 400);
        assert_eq!(sd.demand(&pair().buying), 300);
    }

    #[test]
    fn is_better_than_with_tolerance() {
        let obj1 = TatonnementObjective(wide::square(10_000));
        let obj2 = TatonnementObjective(wide::square(10_001));

        assert!(obj1.is_better_than(&obj2, 0, 1));
        assert!(!obj2.is_better_than(&obj1, 0, 1));

        assert!(obj1.is_better_than(&obj2, 100, 101));
        assert!(obj2.is_better_than(&obj1, 100, 101));
    }

    #[test]
    fn equal_objectives_are_mutually_better() {
        let a = TatonnementObjective(wide::square(123_456_789));
        let b = a;
        assert!(a.is_better_than(&b, 0, 1));
        assert!(b.is_better_than(&a, 0, 1));
    }

    #[test]
    fn strictly_smaller_is_better_at_any_tolerance() {
        let small = TatonnementObjective(wide::square(5));
        let large = TatonnementObjective(wide::square(6));
        for (num, den) in [(0, 1), (1, 100), (1, 1), (255, 1)] {
            assert!(small.is_better_than(&large, num, den));
        }
        assert!(!large.is_better_than(&small, 1, 100));
    }

    #[test]
    fn huge_objectives_do_not_overflow() {
        let huge = TatonnementObjective(wide::square(i128::MAX));
        let bigger = TatonnementObjective(huge.0 + U256::from(1u64));
        assert!(bigger.is_better_than(&huge, 1, 100));
        assert!(!bigger.is_better_than(&huge, 0, 1));
    }
}

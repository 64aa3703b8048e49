//! Solver flows paired with the clearing prices.

use std::collections::BTreeMap;

use clearbatch_pricing::TradeMaximizingSolver;
use clearbatch_types::{AssetPair, ClearbatchError, PriceVector, Result};

use crate::clearing_target::ClearingTarget;

/// Everything settlement needs from price discovery: a flow per traded
/// pair (sell-amount x sell-price units) and the final price vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSolution {
    flows: BTreeMap<AssetPair, i128>,
    prices: PriceVector,
}

impl BatchSolution {
    /// Build a solution from explicit flows. Zero flows are dropped.
    pub fn new(flows: BTreeMap<AssetPair, i128>, prices: PriceVector) -> Result<Self> {
        for (pair, flow) in &flows {
            if *flow < 0 {
                return Err(ClearbatchError::NegativeFlow {
                    pair: pair.clone(),
                    value: *flow,
                });
            }
            prices.get(&pair.selling)?;
            prices.get(&pair.buying)?;
        }
        let flows = flows.into_iter().filter(|(_, flow)| *flow != 0).collect();
        Ok(Self { flows, prices })
    }

    /// Read the optimal allocation out of a solved solver.
    pub fn from_solver(solver: &TradeMaximizingSolver, prices: PriceVector) -> Result<Self> {
        Self::new(solver.solution()?, prices)
    }

    #[must_use]
    pub fn prices(&self) -> &PriceVector {
        &self.prices
    }

    #[must_use]
    pub fn flows(&self) -> &BTreeMap<AssetPair, i128> {
        &self.flows
    }

    /// Flow assigned to `pair`; 0 if it does not trade.
    #[must_use]
    pub fn flow(&self, pair: &AssetPair) -> i128 {
        self.flows.get(pair).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// One target per traded pair, in canonical pair order.
    pub fn produce_clearing_targets(&self) -> Result<Vec<ClearingTarget>> {
        self.flows
            .iter()
            .map(|(pair, flow)| {
                ClearingTarget::new(
                    pair.clone(),
                    self.prices.get(&pair.selling)?,
                    self.prices.get(&pair.buying)?,
                    *flow,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use clearbatch_types::Asset;

    use super::*;

    fn setup() -> (Vec<Asset>, PriceVector) {
        let assets = Asset::test_assets(3);
        let prices = assets
            .iter()
            .enumerate()
            .map(|(i, asset)| (asset.clone(), 100 * (i as u64 + 1)))
            .collect();
        (assets, prices)
    }

    #[test]
    fn targets_carry_prices() {
        let (assets, prices) = setup();
        let pair = AssetPair::new(assets[2].clone(), assets[0].clone()).unwrap();
        let solution = BatchSolution::new(BTreeMap::from([(pair.clone(), 600)]), prices).unwrap();

        let targets = solution.produce_clearing_targets().unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].pair(), &pair);
        assert_eq!(targets[0].sell_price(), 300);
        assert_eq!(targets[0].buy_price(), 100);
        assert_eq!(targets[0].total_clear_target(), 600);
    }

    #[test]
    fn zero_flows_are_dropped() {
        let (assets, prices) = setup();
        let pair = AssetPair::new(assets[0].clone(), assets[1].clone()).unwrap();
        let solution = BatchSolution::new(BTreeMap::from([(pair.clone(), 0)]), prices).unwrap();
        assert!(solution.is_empty());
        assert_eq!(solution.flow(&pair), 0);
    }

    #[test]
    fn rejects_negative_and_unpriced() {
        let (assets, prices) = setup();
        let pair = AssetPair::new(assets[0].clone(), assets[1].clone()).unwrap();
        assert!(matches!(
            BatchSolution::new(BTreeMap::from([(pair, -1)]), prices.clone()),
            Err(ClearbatchError::NegativeFlow { .. })
        ));

        let unknown = AssetPair::new(assets[0].clone(), Asset::test_issued("ZZZ")).unwrap();
        assert!(matches!(
            BatchSolution::new(BTreeMap::from([(unknown, 5)]), prices),
            Err(ClearbatchError::MissingPrice(_))
        ));
    }

    #[test]
    fn reads_solved_flows() {
        let (assets, prices) = setup();
        let mut solver = TradeMaximizingSolver::new(assets.clone());
        let forward = AssetPair::new(assets[0].clone(), assets[1].clone()).unwrap();
        solver.set_upper_bound(&forward, 100).unwrap();
        solver.set_upper_bound(&forward.reverse(), 70).unwrap();
        assert!(BatchSolution::from_solver(&solver, prices.clone()).is_err());

        solver.solve().unwrap();
        let solution = BatchSolution::from_solver(&solver, prices).unwrap();
        assert_eq!(solution.flow(&forward), 70);
        assert_eq!(solution.flow(&forward.reverse()), 70);
        assert_eq!(solution.flows().len(), 2);
    }
}

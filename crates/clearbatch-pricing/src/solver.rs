//! Exact integer trade-maximizing allocation.
//!
//! Given per-pair upper bounds (in sell-amount x price units), finds the
//! largest total flow such that every asset is sold into the market
//! exactly as much as it is bought out of it.
//!
//! ## Tableau
//!
//! ```text
//! variables:  y_ij (flow i -> j) | e_ij (bound slack) | s_i (asset slack)
//! asset row:  sum_j y_ij - sum_j y_ji + s_i = 0
//! bound row:  y_ij + e_ij = bound_ij
//! objective:  maximize sum of bounded y_ij
//! ```
//!
//! The constraint matrix is totally unimodular, so every constraint
//! coefficient stays in {-1, 0, 1} across pivots and no fractions ever
//! appear. Any row operation that would leave that set is reported as
//! [`ClearbatchError::NotUnimodular`].
//!
//! ## Flow recovery
//!
//! Non-basic flows sit at zero, so a cycle of flows that conservation
//! alone cannot pin down is not an error here: the back-solve enters it by
//! fixing its lowest flow at zero and carries on. This happens routinely
//! on random books. Only if the recovered flows then fail conservation at
//! some asset does the solve fail, with
//! [`ClearbatchError::UnresolvedFlowCycle`].

use std::collections::{BTreeMap, BTreeSet};

use clearbatch_types::{Asset, AssetPair, ClearbatchError, Result};

/// One constraint row: {-1, 0, 1} coefficients and a right-hand side.
#[derive(Debug, Clone)]
struct Row {
    coefficients: Vec<i8>,
    rhs: i128,
}

/// Single-use solver for one batch.
#[derive(Debug, Clone)]
pub struct TradeMaximizingSolver {
    assets: Vec<Asset>,
    index: BTreeMap<Asset, usize>,
    rows: Vec<Row>,
    /// Basic variable of each constraint row.
    basis: Vec<usize>,
    /// Objective coefficients. Unlike the constraint rows these can leave
    /// {-1, 0, 1}, since they track reduced costs.
    objective: Vec<i64>,
    /// Flow variables with an upper bound; the rest are pinned at zero.
    active: Vec<bool>,
    bounds: BTreeMap<AssetPair, i128>,
    solution: Option<Vec<i128>>,
}

impl TradeMaximizingSolver {
    /// Solver over the given assets. Order and duplicates do not matter.
    #[must_use]
    pub fn new(mut assets: Vec<Asset>) -> Self {
        assets.sort();
        assets.dedup();
        let n = assets.len();
        let index = assets
            .iter()
            .enumerate()
            .map(|(i, asset)| (asset.clone(), i))
            .collect();

        let mut solver = Self {
            assets,
            index,
            rows: Vec::with_capacity(n),
            basis: Vec::with_capacity(n),
            objective: Vec::new(),
            active: Vec::new(),
            bounds: BTreeMap::new(),
            solution: None,
        };
        let num_vars = solver.num_vars();
        solver.objective = vec![0; num_vars];
        solver.active = vec![false; solver.num_flow_vars()];

        for i in 0..n {
            let mut coefficients = vec![0i8; num_vars];
            for j in (0..n).filter(|&j| j != i) {
                coefficients[solver.flow_var(i, j)] = 1;
                coefficients[solver.flow_var(j, i)] = -1;
            }
            let slack = 2 * solver.num_flow_vars() + i;
            coefficients[slack] = 1;
            solver.rows.push(Row { coefficients, rhs: 0 });
            solver.basis.push(slack);
        }
        solver
    }

    #[must_use]
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    // -----------------------------------------------------------------
    // Variable layout
    // -----------------------------------------------------------------

    fn num_flow_vars(&self) -> usize {
        let n = self.assets.len();
        n * n.saturating_sub(1)
    }

    fn num_vars(&self) -> usize {
        2 * self.num_flow_vars() + self.assets.len()
    }

    fn flow_var(&self, sell: usize, buy: usize) -> usize {
        let n = self.assets.len();
        sell * (n - 1) + if buy > sell { buy - 1 } else { buy }
    }

    fn flow_pair(&self, var: usize) -> (usize, usize) {
        let width = self.assets.len() - 1;
        let sell = var / width;
        let buy = var % width;
        (sell, if buy >= sell { buy + 1 } else { buy })
    }

    fn asset_index(&self, asset: &Asset) -> Result<usize> {
        self.index
            .get(asset)
            .copied()
            .ok_or_else(|| ClearbatchError::UnknownSolverAsset(asset.clone()))
    }

    fn pair_var(&self, pair: &AssetPair) -> Result<usize> {
        let sell = self.asset_index(&pair.selling)?;
        let buy = self.asset_index(&pair.buying)?;
        if sell == buy {
            return Err(ClearbatchError::InvalidAssetPair(pair.clone()));
        }
        Ok(self.flow_var(sell, buy))
    }

    // =================================================================
    // Setup
    // =================================================================

    /// Allow up to `bound` flow on `pair`. Each pair may be bounded once.
    pub fn set_upper_bound(&mut self, pair: &AssetPair, bound: i128) -> Result<()> {
        if self.solution.is_some() {
            return Err(ClearbatchError::SolverAlreadySolved);
        }
        if self.bounds.contains_key(pair) {
            return Err(ClearbatchError::DuplicateUpperBound(pair.clone()));
        }
        if bound <= 0 {
            return Err(ClearbatchError::NonPositiveUpperBound {
                pair: pair.clone(),
                bound,
            });
        }
        let flow = self.pair_var(pair)?;
        let slack = flow + self.num_flow_vars();

        let mut coefficients = vec![0i8; self.num_vars()];
        coefficients[flow] = 1;
        coefficients[slack] = 1;
        self.rows.push(Row {
            coefficients,
            rhs: bound,
        });
        self.basis.push(slack);
        self.active[flow] = true;
        self.objective[flow] = 1;
        self.bounds.insert(pair.clone(), bound);
        Ok(())
    }

    // =================================================================
    // Pivoting
    // =================================================================

    /// Run the pivot loop to optimality and back-solve every flow.
    ///
    /// ## Algorithm
    ///
    /// 1. Entering column: lowest-index bounded flow with a positive
    ///    objective coefficient. Stop when there is none.
    /// 2. Leaving row: smallest right-hand side among rows with a positive
    ///    entry in that column, ties to the lowest basic variable.
    /// 3. Normalize the pivot row to +1 and eliminate the column from every
    ///    other row, including the objective.
    /// 4. Back-solve flows from the final basis and per-asset conservation.
    pub fn solve(&mut self) -> Result<()> {
        if self.solution.is_some() {
            return Err(ClearbatchError::SolverAlreadySolved);
        }
        let mut pivots = 0usize;
        while let Some(column) = self.entering_column() {
            let row = self.leaving_row(column)?;
            self.pivot(row, column)?;
            pivots += 1;
        }
        let solution = self.construct_solution()?;
        tracing::debug!(
            assets = self.assets.len(),
            bounds = self.bounds.len(),
            pivots,
            "Solver finished"
        );
        self.solution = Some(solution);
        Ok(())
    }

    fn entering_column(&self) -> Option<usize> {
        (0..self.num_flow_vars()).find(|&var| self.active[var] && self.objective[var] > 0)
    }

    fn leaving_row(&self, column: usize) -> Result<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.coefficients[column] > 0)
            .min_by_key(|(i, row)| (row.rhs, self.basis[*i]))
            .map(|(i, _)| i)
            .ok_or_else(|| ClearbatchError::DegenerateTableau {
                reason: format!("no leaving row for column {column}"),
            })
    }

    fn pivot(&mut self, pivot_row: usize, column: usize) -> Result<()> {
        let coefficient = self.rows[pivot_row].coefficients[column];
        match coefficient {
            1 => {}
            -1 => {
                let row = &mut self.rows[pivot_row];
                for c in &mut row.coefficients {
                    *c = -*c;
                }
                row.rhs = -row.rhs;
            }
            other => {
                return Err(ClearbatchError::NotUnimodular {
                    reason: format!("pivot coefficient {other} in column {column}"),
                });
            }
        }

        let pivot = self.rows[pivot_row].clone();
        for (i, row) in self.rows.iter_mut().enumerate() {
            let factor = row.coefficients[column];
            if i == pivot_row || factor == 0 {
                continue;
            }
            add_scaled_row(row, &pivot, -factor)?;
        }

        let factor = self.objective[column];
        for (target, &source) in self.objective.iter_mut().zip(&pivot.coefficients) {
            *target = target
                .checked_sub(factor * i64::from(source))
                .ok_or_else(|| ClearbatchError::DegenerateTableau {
                    reason: "objective coefficient overflow".to_string(),
                })?;
        }

        self.basis[pivot_row] = column;
        Ok(())
    }

    // =================================================================
    // Back-solve
    // =================================================================

    /// Recover every flow variable from the final basis.
    ///
    /// Basic flows take their row's right-hand side and unbounded flows are
    /// zero. Each remaining flow is found by conservation at an asset where
    /// it is the only unknown. A cycle of unknowns is entered by fixing its
    /// lowest non-basic flow at zero, its value in the basic solution; the
    /// result is then checked against conservation at every asset.
    fn construct_solution(&self) -> Result<Vec<i128>> {
        let n = self.assets.len();
        let mut values: Vec<Option<i128>> = vec![None; self.num_flow_vars()];

        for (row, &var) in self.rows.iter().zip(&self.basis) {
            if var < self.num_flow_vars() {
                values[var] = Some(row.rhs);
            }
        }

        let mut unknown: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
        for var in 0..self.num_flow_vars() {
            if !self.active[var] {
                values[var] = Some(0);
            } else if values[var].is_none() {
                let (sell, buy) = self.flow_pair(var);
                unknown[sell].insert(var);
                unknown[buy].insert(var);
            }
        }

        loop {
            let next = unknown
                .iter()
                .enumerate()
                .find(|(_, vars)| vars.len() == 1)
                .and_then(|(asset, vars)| vars.first().map(|&var| (asset, var)));

            let (var, value) = if let Some((asset, var)) = next {
                let (sold, bought) = self.known_flows(asset, &values);
                let (sell, _) = self.flow_pair(var);
                let value = if sell == asset { bought - sold } else { sold - bought };
                if value < 0 {
                    let (sell, buy) = self.flow_pair(var);
                    return Err(ClearbatchError::NegativeFlow {
                        pair: AssetPair::new_unchecked(self.assets[sell].clone(), self.assets[buy].clone()),
                        value,
                    });
                }
                (var, value)
            } else if let Some(var) = unknown.iter().filter_map(|vars| vars.first().copied()).min() {
                tracing::debug!(var, "Entering flow cycle at zero");
                (var, 0)
            } else {
                break;
            };

            values[var] = Some(value);
            let (sell, buy) = self.flow_pair(var);
            unknown[sell].remove(&var);
            unknown[buy].remove(&var);
        }

        let values: Vec<i128> = values.into_iter().map(|v| v.unwrap_or(0)).collect();
        for asset in 0..n {
            let (sold, bought) = self.flows_at(asset, &values);
            if sold != bought {
                tracing::warn!(asset = %self.assets[asset], %sold, %bought, "Solver flow not conserved");
                return Err(ClearbatchError::UnresolvedFlowCycle {
                    asset: self.assets[asset].clone(),
                    imbalance: sold - bought,
                });
            }
        }
        Ok(values)
    }

    /// (sold, bought) at `asset` over the flows resolved so far.
    fn known_flows(&self, asset: usize, values: &[Option<i128>]) -> (i128, i128) {
        let mut sold = 0i128;
        let mut bought = 0i128;
        for other in (0..self.assets.len()).filter(|&o| o != asset) {
            sold += values[self.flow_var(asset, other)].unwrap_or(0);
            bought += values[self.flow_var(other, asset)].unwrap_or(0);
        }
        (sold, bought)
    }

    fn flows_at(&self, asset: usize, values: &[i128]) -> (i128, i128) {
        let mut sold = 0i128;
        let mut bought = 0i128;
        for other in (0..self.assets.len()).filter(|&o| o != asset) {
            sold += values[self.flow_var(asset, other)];
            bought += values[self.flow_var(other, asset)];
        }
        (sold, bought)
    }

    // =================================================================
    // Results
    // =================================================================

    /// Solved flow on `pair`, in sell-amount x price units.
    pub fn row_result(&self, pair: &AssetPair) -> Result<i128> {
        let solution = self.solution.as_ref().ok_or(ClearbatchError::SolverNotSolved)?;
        Ok(solution[self.pair_var(pair)?])
    }

    /// Every ordered pair with nonzero flow, in canonical pair order.
    pub fn solution(&self) -> Result<BTreeMap<AssetPair, i128>> {
        let solution = self.solution.as_ref().ok_or(ClearbatchError::SolverNotSolved)?;
        Ok(solution
            .iter()
            .enumerate()
            .filter(|(_, flow)| **flow != 0)
            .map(|(var, flow)| {
                let (sell, buy) = self.flow_pair(var);
                (
                    AssetPair::new_unchecked(self.assets[sell].clone(), self.assets[buy].clone()),
                    *flow,
                )
            })
            .collect())
    }

    /// Upper bound set for `pair`, if any.
    #[must_use]
    pub fn upper_bound(&self, pair: &AssetPair) -> Option<i128> {
        self.bounds.get(pair).copied()
    }
}

/// `target += factor * source` with factor in {-1, 1}, keeping unimodularity.
fn add_scaled_row(target: &mut Row, source: &Row, factor: i8) -> Result<()> {
    for (t, &s) in target.coefficients.iter_mut().zip(&source.coefficients) {
        let sum = *t + factor * s;
        if !(-1..=1).contains(&sum) {
            return Err(ClearbatchError::NotUnimodular {
                reason: format!("row coefficient {sum}"),
            });
        }
        *t = sum;
    }
    let scaled = if factor > 0 { source.rhs } else { -source.rhs };
    target.rhs = target
        .rhs
        .checked_add(scaled)
        .ok_or_else(|| ClearbatchError::DegenerateTableau {
            reason: "right-hand side overflow".to_string(),
        })?;
    Ok(())
}

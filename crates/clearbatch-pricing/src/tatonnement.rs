//! Tatonnement: adaptive-step iterative price search.
//!
//! Each round nudges every price in the direction of its excess demand,
//! `price += price * delta * step`, and keeps the move only if the
//! sum-of-squares objective did not get meaningfully worse. Accepted moves
//! grow the step; rejected ones shrink it. The search always runs exactly
//! `max_rounds` rounds, which bounds its cost per batch.

use clearbatch_types::{ClearbatchError, PriceVector, Result, TatonnementControlParams};

use crate::demand::{SupplyDemand, TatonnementObjective};
use crate::demand_oracle::DemandOracle;
use crate::wide;

// =============================================================================
// Controls
// =============================================================================

/// Validated control parameters plus the limits derived from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TatonnementControls {
    params: TatonnementControlParams,
    pub price_min: u64,
    /// Leaves `smooth_mult + 1` bits of headroom for the smoothing shift.
    pub price_max: u64,
    /// Below this step every trial is accepted.
    pub min_step: u64,
    pub starting_step: u64,
}

impl TatonnementControls {
    pub fn new(params: TatonnementControlParams) -> Result<Self> {
        params.validate()?;
        let min_step = 1u64 << (params.step_size_radix + 1);
        Ok(Self {
            params,
            price_min: 1,
            price_max: u64::MAX >> (params.smooth_mult + 1),
            min_step,
            starting_step: min_step,
        })
    }

    #[must_use]
    pub fn params(&self) -> &TatonnementControlParams {
        &self.params
    }

    /// `(step * step_up) >> step_size_radix`, saturating.
    #[must_use]
    pub fn step_up(&self, step: u64) -> u64 {
        self.scale_step(step, self.params.step_up)
    }

    /// `(step * step_down) >> step_size_radix`.
    #[must_use]
    pub fn step_down(&self, step: u64) -> u64 {
        self.scale_step(step, self.params.step_down)
    }

    fn scale_step(&self, step: u64, factor: u8) -> u64 {
        let scaled = (u128::from(step) * u128::from(factor)) >> self.params.step_size_radix;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn impose_price_bounds(&self, candidate: u64) -> u64 {
        candidate.clamp(self.price_min, self.price_max)
    }

    /// One asset's trial price: `cur + (cur * step * |delta|) >> step_radix`,
    /// moved in the direction of `delta` and clamped into range.
    #[must_use]
    pub fn set_trial_price(&self, cur_price: u64, delta: i128, step: u64) -> u64 {
        let step_times_price = u128::from(cur_price) * u128::from(step);
        let product = wide::product(step_times_price, delta.unsigned_abs());
        let change = wide::compress(&product, u32::from(self.params.step_radix)).unsigned_abs();
        let candidate = if delta > 0 {
            cur_price.saturating_add(change)
        } else {
            cur_price.saturating_sub(change)
        };
        self.impose_price_bounds(candidate)
    }

    /// Trial prices for every asset, in canonical order.
    #[must_use]
    pub fn set_trial_prices(&self, prices: &PriceVector, demand: &SupplyDemand, step: u64) -> PriceVector {
        prices
            .iter()
            .map(|(asset, price)| (asset.clone(), self.set_trial_price(price, demand.delta(asset), step)))
            .collect()
    }
}

// =============================================================================
// Oracle
// =============================================================================

/// Where the search is in its one-shot lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TatonnementState {
    NotStarted,
    Iterating { round: u32 },
    Done,
}

/// What a finished search produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TatonnementOutcome {
    pub prices: PriceVector,
    pub rounds: u32,
    /// Rounds whose trial prices were adopted.
    pub accepted: u32,
    pub starting_objective: TatonnementObjective,
    pub objective: TatonnementObjective,
    pub final_step: u64,
}

/// Single-use price search over one batch's demand.
#[derive(Debug)]
pub struct TatonnementOracle<'a> {
    demand: DemandOracle<'a>,
    controls: TatonnementControls,
    state: TatonnementState,
}

impl<'a> TatonnementOracle<'a> {
    pub fn new(demand: DemandOracle<'a>, params: TatonnementControlParams) -> Result<Self> {
        Ok(Self {
            demand,
            controls: TatonnementControls::new(params)?,
            state: TatonnementState::NotStarted,
        })
    }

    #[must_use]
    pub fn state(&self) -> TatonnementState {
        self.state
    }

    #[must_use]
    pub fn controls(&self) -> &TatonnementControls {
        &self.controls
    }

    fn query(&self, prices: &PriceVector) -> Result<SupplyDemand> {
        let params = self.controls.params();
        self.demand.demand_query(prices, params.smooth_mult, params.tax_rate)
    }

    /// Run the search from `starting_prices` (one entry per asset).
    ///
    /// ## Algorithm
    ///
    /// 1. Baseline demand and objective at the starting prices.
    /// 2. Each round, derive trial prices from the baseline deltas and
    ///    query their demand.
    /// 3. Accept if the trial objective is within tolerance of the
    ///    baseline, or if the step has decayed below `min_step`; accepted
    ///    trials become the baseline and grow the step, rejected ones
    ///    shrink it.
    /// 4. Stop after `max_rounds`.
    pub fn compute_prices(&mut self, starting_prices: PriceVector) -> Result<TatonnementOutcome> {
        if self.state != TatonnementState::NotStarted {
            return Err(ClearbatchError::TatonnementFinished);
        }
        let params = *self.controls.params();

        // 1. Baseline
        let mut prices: PriceVector = starting_prices
            .iter()
            .map(|(asset, price)| (asset.clone(), self.controls.impose_price_bounds(price)))
            .collect();
        let mut baseline = self.query(&prices)?;
        let mut baseline_objective = baseline.objective();
        let starting_objective = baseline_objective;
        let mut step = self.controls.starting_step;
        let mut accepted = 0u32;

        for round in 0..params.max_rounds {
            self.state = TatonnementState::Iterating { round };

            // 2. Trial
            let trial_prices = self.controls.set_trial_prices(&prices, &baseline, step);
            let trial = self.query(&trial_prices)?;
            let trial_objective = trial.objective();

            // 3. Accept or reject
            if trial_objective.is_better_than(&baseline_objective, params.tolerance_num, params.tolerance_den)
                || step < self.controls.min_step
            {
                prices = trial_prices;
                baseline = trial;
                baseline_objective = trial_objective;
                step = self.controls.step_up(step);
                accepted += 1;
            } else {
                step = self.controls.step_down(step);
            }
        }
        self.state = TatonnementState::Done;

        tracing::info!(
            rounds = params.max_rounds,
            accepted,
            assets = prices.len(),
            final_step = step,
            "Tatonnement finished"
        );

        Ok(TatonnementOutcome {
            prices,
            rounds: params.max_rounds,
            accepted,
            starting_objective,
            objective: baseline_objective,
            final_step: step,
        })
    }
}

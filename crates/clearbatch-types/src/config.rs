//! Per-round configuration snapshot.
//!
//! The snapshot is an immutable value handed to the engine for one batch.
//! Nothing in the engine reads configuration from global state.

use serde::{Deserialize, Serialize};

use crate::{constants, Asset, AssetPair, AssetPrice, ClearbatchError, IocOffer, PriceVector, Result};

/// Tuning knobs for the Tatonnement price search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TatonnementControlParams {
    /// Reserved buyer-side demand adjustment shift; 0 disables it.
    pub tax_rate: u8,
    /// Width of the partial-execution band as a power-of-two shift.
    pub smooth_mult: u8,
    /// Hard cap on search rounds.
    pub max_rounds: u32,
    /// Step growth factor, applied as `(step * step_up) >> step_size_radix`.
    pub step_up: u8,
    /// Step shrink factor, applied as `(step * step_down) >> step_size_radix`.
    pub step_down: u8,
    pub step_size_radix: u8,
    /// Fractional bits of the step itself in `price * delta * step`.
    pub step_radix: u8,
    pub tolerance_num: u8,
    pub tolerance_den: u8,
}

impl Default for TatonnementControlParams {
    fn default() -> Self {
        Self {
            tax_rate: constants::DEFAULT_TAX_RATE,
            smooth_mult: constants::DEFAULT_SMOOTH_MULT,
            max_rounds: constants::DEFAULT_MAX_ROUNDS,
            step_up: constants::DEFAULT_STEP_UP,
            step_down: constants::DEFAULT_STEP_DOWN,
            step_size_radix: constants::DEFAULT_STEP_SIZE_RADIX,
            step_radix: constants::DEFAULT_STEP_RADIX,
            tolerance_num: constants::DEFAULT_TOLERANCE_NUM,
            tolerance_den: constants::DEFAULT_TOLERANCE_DEN,
        }
    }
}

impl TatonnementControlParams {
    /// Reject parameters whose shifts would overflow the fixed-point math.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(ClearbatchError::InvalidControls { reason });
        if self.smooth_mult >= 63 {
            return invalid(format!("smooth_mult {} must be below 63", self.smooth_mult));
        }
        if self.tax_rate >= 64 {
            return invalid(format!("tax_rate {} must be below 64", self.tax_rate));
        }
        if self.step_size_radix >= 62 {
            return invalid(format!(
                "step_size_radix {} must be below 62",
                self.step_size_radix
            ));
        }
        if self.tolerance_den == 0 {
            return invalid("tolerance denominator is zero".to_string());
        }
        Ok(())
    }
}

/// Parameters of a simulated constant-product pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmConfig {
    pub asset_a: Asset,
    pub asset_b: Asset,
    pub amount_a: i64,
    pub amount_b: i64,
    #[serde(default = "default_pool_fee")]
    pub fee: u32,
}

fn default_pool_fee() -> u32 {
    constants::DEFAULT_SIMULATED_POOL_FEE
}

/// Everything a batch needs to know about the round it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    assets: Vec<Asset>,
    pub controls: TatonnementControlParams,
    /// Explicit starting prices; assets not listed start at the default.
    #[serde(default)]
    pub starting_prices: Vec<AssetPrice>,
}

impl ConfigSnapshot {
    /// Build a snapshot. Assets are sorted and de-duplicated.
    pub fn new(mut assets: Vec<Asset>, controls: TatonnementControlParams) -> Result<Self> {
        controls.validate()?;
        assets.sort();
        assets.dedup();
        Ok(Self {
            assets,
            controls,
            starting_prices: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_starting_prices(mut self, prices: Vec<AssetPrice>) -> Self {
        self.starting_prices = prices;
        self
    }

    /// Parse a snapshot from JSON, normalizing and validating it.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Self = serde_json::from_str(json)?;
        let prices = raw.starting_prices;
        Ok(Self::new(raw.assets, raw.controls)?.with_starting_prices(prices))
    }

    /// Canonically ordered asset list.
    #[must_use]
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    #[must_use]
    pub fn is_valid_asset(&self, asset: &Asset) -> bool {
        self.assets.binary_search(asset).is_ok()
    }

    #[must_use]
    pub fn is_valid_asset_pair(&self, pair: &AssetPair) -> bool {
        pair.selling != pair.buying && self.is_valid_asset(&pair.selling) && self.is_valid_asset(&pair.buying)
    }

    /// Admission check for an offer entering the open batch.
    pub fn validate_offer(&self, pair: &AssetPair, offer: &IocOffer) -> Result<()> {
        if !self.is_valid_asset_pair(pair) {
            return Err(ClearbatchError::InvalidAssetPair(pair.clone()));
        }
        if offer.sell_amount <= 0 {
            return Err(ClearbatchError::InvalidOffer {
                reason: format!("sell amount {} is not positive", offer.sell_amount),
            });
        }
        Ok(())
    }

    /// Starting price vector: explicit entries for known assets, the
    /// default price for every other configured asset.
    pub fn starting_prices(&self) -> Result<PriceVector> {
        let mut prices: PriceVector = self
            .assets
            .iter()
            .map(|asset| (asset.clone(), constants::DEFAULT_STARTING_PRICE))
            .collect();
        for entry in &self.starting_prices {
            if !self.is_valid_asset(&entry.asset) {
                return Err(ClearbatchError::Configuration(format!(
                    "starting price for unknown asset {}",
                    entry.asset
                )));
            }
            if entry.price == 0 {
                return Err(ClearbatchError::Configuration(format!(
                    "zero starting price for {}",
                    entry.asset
                )));
            }
            prices.set(entry.asset.clone(), entry.price);
        }
        Ok(prices)
    }
}

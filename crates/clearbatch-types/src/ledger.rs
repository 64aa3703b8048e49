//! The ledger-state boundary.
//!
//! Account balances and pool reserves live in the ledger, outside this
//! engine. The engine reads and mutates them only through [`LedgerState`];
//! atomic commit and rollback of a round are the implementor's job.

use serde::{Deserialize, Serialize};

use crate::{AccountId, Asset, PoolId, Result};

/// Stored state of one constant-product pool.
///
/// `asset_a` is always the canonically lower asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub pool_id: PoolId,
    pub asset_a: Asset,
    pub asset_b: Asset,
    pub reserve_a: i64,
    pub reserve_b: i64,
    /// Fee in parts per [`crate::constants::FEE_DENOMINATOR`].
    pub fee: u32,
}

impl PoolEntry {
    /// Build an entry, putting the assets (and reserves) in canonical order.
    #[must_use]
    pub fn new(asset_x: Asset, asset_y: Asset, reserve_x: i64, reserve_y: i64, fee: u32) -> Self {
        let pool_id = PoolId::for_assets(&asset_x, &asset_y);
        if asset_x < asset_y {
            Self {
                pool_id,
                asset_a: asset_x,
                asset_b: asset_y,
                reserve_a: reserve_x,
                reserve_b: reserve_y,
                fee,
            }
        } else {
            Self {
                pool_id,
                asset_a: asset_y,
                asset_b: asset_x,
                reserve_a: reserve_y,
                reserve_b: reserve_x,
                fee,
            }
        }
    }
}

/// Read/write access to balances and pools for one round.
pub trait LedgerState {
    /// Add `delta` (possibly negative) to an account's balance of `asset`.
    ///
    /// # Errors
    /// Fails if the balance would go negative or overflow.
    fn add_balance(&mut self, account: &AccountId, asset: &Asset, delta: i64) -> Result<()>;

    /// Credit the native-asset fee pool.
    fn add_to_fee_pool(&mut self, amount: i64) -> Result<()>;

    /// Load the pool between two assets, if one exists. Order does not matter.
    fn load_pool(&self, a: &Asset, b: &Asset) -> Option<PoolEntry>;

    /// Overwrite a pool's stored state.
    fn store_pool(&mut self, entry: PoolEntry) -> Result<()>;
}

//! # clearbatch-types
//!
//! Shared types, errors, and configuration for the **clearbatch**
//! batch-auction engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`AccountId`], [`PoolId`], [`OfferHash`]
//! - **Assets**: [`Asset`], [`AssetPair`]
//! - **Prices**: [`Price`], [`PriceVector`], [`AssetPrice`]
//! - **Offers**: [`IocOffer`]
//! - **Configuration**: [`ConfigSnapshot`], [`TatonnementControlParams`], [`AmmConfig`]
//! - **Results**: [`OfferClearingStatus`], [`PoolClearingStatus`], [`BatchResults`]
//! - **Ledger boundary**: [`LedgerState`], [`PoolEntry`]
//! - **Errors**: [`ClearbatchError`] with `CB_ERR_` prefix codes
//! - **Constants**: fixed-point radixes, defaults, hash domains

pub mod asset;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod offer;
pub mod price;
pub mod receipt;

pub use asset::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use ledger::*;
pub use offer::*;
pub use price::*;
pub use receipt::*;

// Constants are accessed via `clearbatch_types::constants::FOO`
// (not re-exported to avoid name collisions).

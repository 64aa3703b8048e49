//! # clearbatch-settlement
//!
//! **Settlement plane**: turns a price vector and per-pair flows into
//! balance changes, pool trades, receipts and a results root.
//!
//! ## Architecture
//!
//! Settlement receives a [`BatchSolution`] from price discovery and:
//! 1. Builds one [`ClearingTarget`] per traded pair
//! 2. Clears offers in price order, rounding every amount toward the market
//! 3. Sells residual flow into the pair's constant-product pool
//! 4. Routes per-asset rounding surplus to the issuer or the fee pool
//! 5. Writes pools back and seals the results
//!
//! [`run_batch`] strings all of it together with the pricing crate.
//! Ledger access goes through [`clearbatch_types::LedgerState`];
//! [`InMemoryLedger`] is the reference implementation.

pub mod batch_clearer;
pub mod batch_solution;
pub mod clearing_target;
pub mod engine;
pub mod memory_ledger;
pub mod rounding;

pub use batch_clearer::clear_batch;
pub use batch_solution::BatchSolution;
pub use clearing_target::ClearingTarget;
pub use engine::{run_batch, submit_offer};
pub use memory_ledger::{InMemoryLedger, LedgerSnapshot};
pub use rounding::RoundingSurplusTracker;

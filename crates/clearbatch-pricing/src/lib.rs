//! # clearbatch-pricing
//!
//! **Pure deterministic price discovery and allocation for clearbatch.**
//!
//! This crate is the compute plane of a batch: it turns a sealed set of
//! IOC offers and constant-product pools into clearing prices and a
//! per-pair flow allocation. It has:
//!
//! - **Exact integer math only**: fixed-point tables, 256-bit accumulators,
//!   and a pivot loop whose coefficients never leave {-1, 0, 1}
//! - **Canonical iteration**: every map is ordered, so the same inputs give
//!   the same prices and flows on every node
//! - **No ledger writes**: pools touch ledger state only through an
//!   explicit `flush`
//!
//! ```text
//! OrderbookManager + LiquidityPoolSet
//!        -> DemandOracle -> TatonnementOracle (prices)
//!        -> DemandOracle::set_solver_upper_bounds -> TradeMaximizingSolver (flows)
//! ```

pub mod demand;
pub mod demand_oracle;
pub mod determinism;
pub mod liquidity_pool;
pub mod orderbook;
pub mod orderbook_manager;
pub mod pool_set;
pub mod solver;
pub mod tatonnement;
pub mod wide;

pub use demand::{SupplyDemand, TatonnementObjective};
pub use demand_oracle::DemandOracle;
pub use determinism::{compute_results_root, verify_results_root};
pub use liquidity_pool::{LedgerPool, LiquidityPoolBackend, LiquidityPoolFrame, SimulatedPool};
pub use orderbook::{IocOrderbook, PriceCompStats};
pub use orderbook_manager::OrderbookManager;
pub use pool_set::LiquidityPoolSet;
pub use solver::TradeMaximizingSolver;
pub use tatonnement::{TatonnementControls, TatonnementOracle, TatonnementOutcome, TatonnementState};
pub use wide::U256;

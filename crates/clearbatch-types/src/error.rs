//! Error types for the clearbatch engine.
//!
//! All errors use the `CB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Offer / order book errors
//! - 2xx: Ledger and balance errors
//! - 3xx: Liquidity pool errors
//! - 4xx: Tatonnement / configuration errors
//! - 5xx: Solver errors
//! - 6xx: Clearing errors
//! - 9xx: Serialization and configuration errors
//!
//! Nothing inside a batch is recoverable. Every variant falls into one of
//! two fatal classes (see [`ErrorClass`]); callers abort the round and let
//! the ledger collaborator discard its mutations.

use thiserror::Error;

use crate::{Asset, AssetPair};

/// The two fatal error classes of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Upstream construction bug: the engine reached a state it must never reach.
    InvariantViolation,
    /// A public entry point was called in the wrong lifecycle state or with bad input.
    CallerMisuse,
}

/// Central error enum for all clearbatch operations.
#[derive(Debug, Error)]
pub enum ClearbatchError {
    // =================================================================
    // Offer / Order Book Errors (1xx)
    // =================================================================
    /// The offer failed validation (non-positive amount, bad price, ...).
    #[error("CB_ERR_100: Invalid offer: {reason}")]
    InvalidOffer { reason: String },

    /// The pair is not tradeable under the current config snapshot.
    #[error("CB_ERR_101: Invalid asset pair: {0}")]
    InvalidAssetPair(AssetPair),

    /// Offers cannot be added once the batch is sealed.
    #[error("CB_ERR_102: Batch already sealed")]
    BatchAlreadySealed,

    /// Demand queries and clearing require a sealed batch.
    #[error("CB_ERR_103: Batch not sealed")]
    BatchNotSealed,

    /// The order book (or the whole batch) has already been cleared.
    #[error("CB_ERR_104: Already cleared")]
    AlreadyCleared,

    /// Tried to merge books for different pairs.
    #[error("CB_ERR_105: Order book pair mismatch: expected {expected}, got {actual}")]
    PairMismatch {
        expected: AssetPair,
        actual: AssetPair,
    },

    // =================================================================
    // Ledger / Balance Errors (2xx)
    // =================================================================
    /// A balance would go negative.
    #[error("CB_ERR_200: Insufficient balance of {asset} for {account}: need {needed}, have {available}")]
    InsufficientBalance {
        account: String,
        asset: Asset,
        needed: i64,
        available: i64,
    },

    /// A balance or the fee pool would overflow 64 bits.
    #[error("CB_ERR_201: Balance overflow for {asset}")]
    BalanceOverflow { asset: Asset },

    /// A pool write referenced a pool the ledger does not know.
    #[error("CB_ERR_202: Pool not found: {0}")]
    PoolNotFound(String),

    // =================================================================
    // Liquidity Pool Errors (3xx)
    // =================================================================
    /// The fee-adjusted constant product would decrease.
    #[error("CB_ERR_300: Pool invariant violation: {reason}")]
    PoolInvariantViolation { reason: String },

    /// A pool trade asked for more than the pool offers, or a negative amount.
    #[error("CB_ERR_301: Invalid pool trade: {reason}")]
    InvalidPoolTrade { reason: String },

    /// Pool reserves or parameters are malformed.
    #[error("CB_ERR_302: Invalid pool: {reason}")]
    InvalidPool { reason: String },

    // =================================================================
    // Tatonnement / Config Errors (4xx)
    // =================================================================
    /// A price vector did not contain an asset it was queried for.
    #[error("CB_ERR_400: Missing price for asset {0}")]
    MissingPrice(Asset),

    /// Control parameters would overflow the fixed-point arithmetic.
    #[error("CB_ERR_401: Invalid tatonnement controls: {reason}")]
    InvalidControls { reason: String },

    /// The price search has already produced its result.
    #[error("CB_ERR_402: Tatonnement already finished")]
    TatonnementFinished,

    // =================================================================
    // Solver Errors (5xx)
    // =================================================================
    /// Bounds cannot change and the solver cannot rerun after solving.
    #[error("CB_ERR_500: Solver already solved")]
    SolverAlreadySolved,

    /// Results are only readable after solving.
    #[error("CB_ERR_501: Solver not solved")]
    SolverNotSolved,

    /// The same pair was bounded twice.
    #[error("CB_ERR_502: Upper bound already set for {0}")]
    DuplicateUpperBound(AssetPair),

    /// Bounds must be strictly positive.
    #[error("CB_ERR_503: Non-positive upper bound {bound} for {pair}")]
    NonPositiveUpperBound { pair: AssetPair, bound: i128 },

    /// The asset is not part of the solver's asset set.
    #[error("CB_ERR_504: Unknown solver asset {0}")]
    UnknownSolverAsset(Asset),

    /// A pivot or row operation left the {-1, 0, 1} coefficient set.
    #[error("CB_ERR_505: Tableau not unimodular: {reason}")]
    NotUnimodular { reason: String },

    /// No row can leave the basis for an entering column.
    #[error("CB_ERR_506: Degenerate tableau: {reason}")]
    DegenerateTableau { reason: String },

    /// A flow cycle entered at zero left an asset unbalanced.
    #[error("CB_ERR_507: Unresolved flow cycle: {asset} off by {imbalance}")]
    UnresolvedFlowCycle { asset: Asset, imbalance: i128 },

    /// Back-solving derived a negative flow.
    #[error("CB_ERR_508: Negative flow {value} on {pair}")]
    NegativeFlow { pair: AssetPair, value: i128 },

    // =================================================================
    // Clearing Errors (6xx)
    // =================================================================
    /// An offer's limit price does not admit the clearing prices.
    #[error("CB_ERR_600: Offer price incompatible with clearing prices on {0}")]
    IncompatibleOfferPrice(AssetPair),

    /// Offers and pool together could not realize the target.
    #[error("CB_ERR_601: Clearing target not met on {pair}: {realized} of {total}")]
    ClearingTargetNotMet {
        pair: AssetPair,
        realized: i128,
        total: i128,
    },

    /// Per-asset rounding surplus went negative.
    #[error("CB_ERR_602: Market paid out more {asset} than it received: deficit {deficit}")]
    MarketDeficit { asset: Asset, deficit: i128 },

    /// An amount that must be non-negative (or fit 64 bits) did not.
    #[error("CB_ERR_603: Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    // =================================================================
    // General (9xx)
    // =================================================================
    /// Serialization / deserialization error.
    #[error("CB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid snapshot contents).
    #[error("CB_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl ClearbatchError {
    /// Which fatal class this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidOffer { .. }
            | Self::InvalidAssetPair(_)
            | Self::BatchAlreadySealed
            | Self::BatchNotSealed
            | Self::AlreadyCleared
            | Self::PairMismatch { .. }
            | Self::InsufficientBalance { .. }
            | Self::MissingPrice(_)
            | Self::InvalidControls { .. }
            | Self::TatonnementFinished
            | Self::SolverAlreadySolved
            | Self::SolverNotSolved
            | Self::UnknownSolverAsset(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => ErrorClass::CallerMisuse,
            _ => ErrorClass::InvariantViolation,
        }
    }

    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        self.class() == ErrorClass::InvariantViolation
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, ClearbatchError>;

impl From<serde_json::Error> for ClearbatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_message_carries_code_prefix() {
        let errors = vec![
            ClearbatchError::BatchAlreadySealed,
            ClearbatchError::SolverNotSolved,
            ClearbatchError::UnresolvedFlowCycle {
                asset: Asset::Native,
                imbalance: 3,
            },
            ClearbatchError::MarketDeficit {
                asset: Asset::Native,
                deficit: -1,
            },
            ClearbatchError::PoolNotFound("pool:00".into()),
        ];
        for err in errors {
            assert!(err.to_string().starts_with("CB_ERR_"), "{err}");
        }
    }

    #[test]
    fn classes_split_misuse_from_invariants() {
        assert_eq!(ClearbatchError::BatchNotSealed.class(), ErrorClass::CallerMisuse);
        assert_eq!(
            ClearbatchError::DuplicateUpperBound(AssetPair::new_unchecked(
                Asset::Native,
                Asset::test_issued("USD")
            ))
            .class(),
            ErrorClass::InvariantViolation
        );
        assert!(
            ClearbatchError::PoolInvariantViolation {
                reason: "k shrank".into()
            }
            .is_invariant_violation()
        );
    }

    #[test]
    fn serde_error_converts() {
        let err: ClearbatchError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.to_string().starts_with("CB_ERR_901"));
    }
}

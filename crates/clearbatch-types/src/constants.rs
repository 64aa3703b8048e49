//! System-wide constants for the clearbatch engine.

/// Fractional bits of the order book's cumulative (amount x price) table.
pub const OFFERED_TIMES_PRICE_RADIX: u32 = 32;

/// Pool fees are expressed in parts per this denominator.
pub const FEE_DENOMINATOR: u32 = 10_000;

/// Fee charged by simulated pools when none is configured.
pub const DEFAULT_SIMULATED_POOL_FEE: u32 = 30;

/// Price every asset starts from when the snapshot gives none (1.0 in 32.32).
pub const DEFAULT_STARTING_PRICE: u64 = 1 << 32;

/// Lowest price the search will ever set.
pub const PRICE_MIN: u64 = 1;

/// Upper bound (inclusive) for offer price numerator and denominator.
pub const MAX_PRICE_COMPONENT: u32 = i32::MAX as u32;

/// Maximum length of an issued asset code.
pub const MAX_ASSET_CODE_LEN: usize = 12;

// -- Tatonnement defaults ---------------------------------------------------

pub const DEFAULT_TAX_RATE: u8 = 0;
pub const DEFAULT_SMOOTH_MULT: u8 = 5;
pub const DEFAULT_MAX_ROUNDS: u32 = 1000;
pub const DEFAULT_STEP_UP: u8 = 45;
pub const DEFAULT_STEP_DOWN: u8 = 25;
pub const DEFAULT_STEP_SIZE_RADIX: u8 = 5;
pub const DEFAULT_STEP_RADIX: u8 = 65;

/// Trial prices are accepted within `1 + NUM/DEN` of the baseline objective.
pub const DEFAULT_TOLERANCE_NUM: u8 = 1;
pub const DEFAULT_TOLERANCE_DEN: u8 = 100;

// -- Hash domain tags -------------------------------------------------------

pub const OFFER_HASH_DOMAIN: &[u8] = b"clearbatch:offer:v1:";
pub const POOL_ID_DOMAIN: &[u8] = b"clearbatch:pool:v1:";
pub const RESULTS_ROOT_DOMAIN: &[u8] = b"clearbatch:results_root:v1:";

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "clearbatch";

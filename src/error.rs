use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Which cap a rejected deposit ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LimitKind {
    TotalValueLocked,
    PerDepositorCap,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::TotalValueLocked => write!(f, "total value locked"),
            LimitKind::PerDepositorCap => write!(f, "per-depositor cap"),
        }
    }
}

/// Main error type for vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    // Authorization errors
    #[error("Unauthorized: {caller} may not call {operation}")]
    Unauthorized {
        operation: &'static str,
        caller: Pubkey,
    },

    // Limit errors
    #[error("Limit exceeded ({kind}): limit {limit}, requested {requested}")]
    LimitExceeded {
        kind: LimitKind,
        limit: u64,
        requested: u64,
    },

    #[error("Depositor not whitelisted: {0}")]
    NotWhitelisted(Pubkey),

    #[error("Invalid limits: {0}")]
    InvalidLimits(String),

    // Balance errors
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Insufficient liquidity in vault custody: required {required}, available {available}")]
    InsufficientLiquidity { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // State machine errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Strategy already initialized: {0}")]
    AlreadyInitialized(Pubkey),

    #[error("Strategy not found: {0}")]
    VaultNotFound(Pubkey),

    // External venue errors
    #[error("External venue failure: {0}")]
    ExternalVenueFailure(String),

    // Fatal errors
    #[error("Address derivation failure: {0}")]
    AddressDerivationFailure(String),

    #[error("Internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    #[error("Math overflow")]
    MathOverflow,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// The caller may retry later, or rebalance first, and expect success.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VaultError::ExternalVenueFailure(_) | VaultError::InsufficientLiquidity { .. }
        )
    }

    /// The vault must not proceed without operator intervention.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VaultError::AddressDerivationFailure(_) | VaultError::InternalInvariantViolation(_)
        )
    }
}

/// Result type alias for VaultError
pub type Result<T> = std::result::Result<T, VaultError>;

use thiserror::Error;

use typhoon_chain::ChainError;
use typhoon_store::StoreError;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("contract_address is required")]
    MissingContract,

    #[error("invalid address in {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("token decimals unknown: set token_decimals or payment_token_address")]
    MissingDecimals,

    #[error("could not read decimals() from payment token: {0}")]
    DecimalsUnavailable(String),

    #[error("token decimals {configured} conflict with stored value {stored}")]
    DecimalsConflict { configured: u8, stored: u8 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("backoff_initial_ms ({initial}) exceeds backoff_max_ms ({max})")]
    BackoffOrder { initial: u64, max: u64 },

    #[error("invalid log format '{0}', expected 'human' or 'json'")]
    LogFormat(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// A failed reconciliation cycle. Never escapes the run loop; it becomes a
/// backoff and the status' `last_error`.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Chain(e) => e.is_transient(),
            ReconcileError::Store(_) => true,
        }
    }
}

/// Why an account registration was refused.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("already registered: {0}")]
    Taken(String),

    #[error("could not allocate a unique referral id")]
    ReferralIdExhausted,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(what) => RegistrationError::Taken(what),
            other => RegistrationError::Store(other),
        }
    }
}

use thiserror::Error;

/// Validation and contract errors exposed by `perpscope-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid coin '{value}', expected one of BTC, ETH")]
    InvalidAsset { value: String },
    #[error("instrument symbol cannot be empty")]
    EmptyInstrument,
    #[error("instrument '{value}' has no exchange code suffix")]
    MissingExchangeCode { value: String },

    #[error("invalid history interval '{value}', expected one of 1hour, 4hour")]
    InvalidInterval { value: String },
    #[error("invalid source '{value}', expected one of coinalyze, hyperliquid, coingecko")]
    InvalidSource { value: String },

    #[error("history lookback must be at least one interval")]
    LookbackTooShort,
}

/// Errors raised while loading runtime configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value '{value}'")]
    InvalidVar { name: &'static str, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

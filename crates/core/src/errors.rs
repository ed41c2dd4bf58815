//! Error types

use thiserror::Error;

/// Oracle client errors. These abort the current update iteration.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("RPC request failed: {0}")]
    Request(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Invalid account key: {0}")]
    InvalidKey(String),

    #[error("Invalid account data for {key}: {reason}")]
    InvalidAccount { key: String, reason: String },
}

/// Exchange-rate lookup errors. Absorbed by the provider.
#[derive(Debug, Error)]
pub enum RateError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed view response: {0}")]
    Malformed(String),

    #[error("Invalid fixed-point value: {0}")]
    InvalidNumber(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias
pub type OracleResult<T> = Result<T, OracleError>;
pub type RateResult<T> = Result<T, RateError>;

//! Error types shared across Ratekeeper crates.

use thiserror::Error;

/// Errors raised while building or parsing shared value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Currency code is not 2..5 uppercase ASCII alphanumerics.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrencyCode(String),

    /// Pair key is not of the form `<BASE>_<QUOTE>`.
    #[error("Invalid pair key: {0:?}")]
    InvalidPairKey(String),

    /// Timestamp could not be parsed.
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

impl CommonError {
    /// Get error code for log records.
    pub fn error_code(&self) -> &'static str {
        match self {
            CommonError::InvalidCurrencyCode(_) => "INVALID_CURRENCY_CODE",
            CommonError::InvalidPairKey(_) => "INVALID_PAIR_KEY",
            CommonError::InvalidTimestamp(_) => "INVALID_TIMESTAMP",
        }
    }
}

/// Result type alias for shared type construction.
pub type Result<T> = std::result::Result<T, CommonError>;

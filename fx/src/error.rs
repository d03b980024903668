//! Rate engine error types.

use ratekeeper_common::CurrencyPair;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single provider call. Recoverable: the aggregator logs it and
/// moves on to the next provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (DNS, connect, TLS, body read).
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not finish within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Upstream answered with a non-success HTTP status.
    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    /// Response body did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Upstream reported a logical failure in an otherwise valid response.
    #[error("Request rejected by upstream: {0}")]
    Rejected(String),

    /// A credential the provider needs is not configured.
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),
}

impl From<reqwest::Error> for ProviderError {
    // Request URLs can carry API keys.
    fn from(e: reqwest::Error) -> Self {
        let e = e.without_url();
        if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Errors that can occur in the rate engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// Writing persisted state failed. The previously committed file is untouched.
    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State could not be encoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl FxError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FxError::Persistence {
            path: path.into(),
            source,
        }
    }
}

/// Result type for rate engine operations.
pub type FxResult<T> = Result<T, FxError>;

/// Why a rate could not be served to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The currency is not known to the system.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Nothing is cached, even after a refresh attempt.
    #[error("No rates available")]
    NoData,

    /// Rates are cached, but not for this pair.
    #[error("Rate not tracked for {0}")]
    PairNotTracked(CurrencyPair),

    /// The cached rate is zero (or otherwise unusable) and cannot be inverted.
    #[error("Rate unavailable for {0}")]
    ZeroRate(CurrencyPair),
}

impl LookupError {
    /// Get error code for log records.
    pub fn error_code(&self) -> &'static str {
        match self {
            LookupError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            LookupError::NoData => "NO_DATA",
            LookupError::PairNotTracked(_) => "PAIR_NOT_TRACKED",
            LookupError::ZeroRate(_) => "ZERO_RATE",
        }
    }
}

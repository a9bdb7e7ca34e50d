//! Error types for the screener service.

use thiserror::Error;

/// Result type alias using the screener error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the screener service.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// No history provider returned data for the symbol
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// External service error
    #[error("External service error: {0}")]
    External(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error means the requested symbol has no data.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::SymbolNotFound(_))
    }

    /// Stable machine-readable code for API responses.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::SymbolNotFound(_) => "SYMBOL_NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::External(_) => "EXTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Internal(_) | Self::Io(_) | Self::Json(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::SymbolNotFound(_) => 404,
            Self::InvalidInput(_) | Self::Config(_) => 400,
            Self::RateLimited(_) => 429,
            Self::Timeout => 408,
            Self::External(_) => 502,
            _ => 500,
        }
    }
}

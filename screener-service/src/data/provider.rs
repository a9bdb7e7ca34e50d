//! Provider abstractions for daily history and market metadata.
//!
//! `HistoryProvider` is the capability the history fetcher walks through in
//! priority order; `MarketDirectory` answers stock metadata and listing queries.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use super::{AdjustMode, RawRow, StockBasic};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, timeout, non-2xx status)
    Network(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// Data not available for the requested symbol
    DataNotAvailable(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
    /// Invalid request parameters (e.g. a symbol the provider cannot map)
    InvalidRequest(String),
    /// Internal provider error (malformed payload)
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for screener_common::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::DataNotAvailable(msg) => Self::NotFound(msg),
            ProviderError::InvalidRequest(msg) => Self::InvalidInput(msg),
            ProviderError::RateLimited { .. } => Self::RateLimited(err.to_string()),
            other => Self::External(other.to_string()),
        }
    }
}

impl ProviderError {
    /// Map an HTTP status to a provider error. Only call for non-2xx statuses.
    pub fn from_status(status: reqwest::StatusCode, retry_after_secs: Option<u64>) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited { retry_after_secs }
        } else {
            Self::Network(format!("HTTP {}", status))
        }
    }

    /// Map a transport error from reqwest.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Read a `Retry-After` header expressed in seconds.
pub(crate) fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// History Provider Trait
// ============================================================================

/// One daily-history request as seen by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Symbol in the form this attempt should use (may carry a synthesized prefix)
    pub symbol: String,
    /// Inclusive start date
    pub start: NaiveDate,
    /// Inclusive end date
    pub end: NaiveDate,
    /// Price adjustment
    pub adjust: AdjustMode,
}

impl HistoryQuery {
    /// Same window, different symbol form.
    pub fn with_symbol(&self, symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..self.clone()
        }
    }
}

/// Trait for daily history sources.
///
/// Implementations return raw rows in whatever order the upstream sends them;
/// the fetcher normalizes them. An empty vector counts as "no data".
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Provider name reported as the series `source`
    fn name(&self) -> &'static str;

    /// Fetch raw daily rows.
    async fn query(&self, query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError>;
}

// ============================================================================
// Market Directory Trait
// ============================================================================

/// Trait for stock metadata and market listing lookups.
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    /// Name, industry and area for one symbol.
    async fn stock_basic(&self, symbol: &str) -> Result<StockBasic, ProviderError>;

    /// All listed symbols for a market (`cn`, `hk`, `us`), optionally narrowed
    /// to one exchange. Unknown markets yield an empty list.
    async fn list_symbols(
        &self,
        market: &str,
        exchange: Option<&str>,
    ) -> Result<Vec<String>, ProviderError>;
}

/// Upper bound on the number of symbols a listing returns.
pub const MAX_LISTED_SYMBOLS: usize = 200;

/// List a market's symbols, truncated to [`MAX_LISTED_SYMBOLS`].
pub async fn listed_symbols(
    directory: &dyn MarketDirectory,
    market: &str,
    exchange: Option<&str>,
) -> Result<Vec<String>, ProviderError> {
    let mut symbols = directory.list_symbols(market, exchange).await?;
    symbols.truncate(MAX_LISTED_SYMBOLS);
    Ok(symbols)
}

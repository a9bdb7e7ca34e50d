//! Market data module.
//!
//! Provides the daily bar model, the provider capabilities consumed by the
//! history fetcher, and the concrete HTTP providers.
//!
//! # Data Sources
//! - **Eastmoney** (Primary): domestic A-share daily K-lines and quote metadata
//! - **Tencent** (Secondary): `fqkline` endpoint covering A-share, HK and US codes
//! - **Yahoo** (Overseas): chart endpoint for alphabetic tickers

mod eastmoney;
mod normalize;
mod provider;
mod synthetic;
mod tencent;
mod yahoo;

pub use eastmoney::{
    EastmoneyProvider, DEFAULT_HISTORY_BASE as EASTMONEY_HISTORY_BASE,
    DEFAULT_QUOTE_BASE as EASTMONEY_QUOTE_BASE,
};
pub use normalize::{normalize_rows, DEFAULT_PRICE, DEFAULT_TURNOVER, DEFAULT_VOLUME};
pub use provider::{
    listed_symbols, HistoryProvider, HistoryQuery, MarketDirectory, ProviderError,
    MAX_LISTED_SYMBOLS,
};
pub use synthetic::{synthesize_random_walk, SYNTHETIC_BARS, SYNTHETIC_SOURCE};
pub use tencent::{TencentProvider, DEFAULT_BASE as TENCENT_BASE};
pub use yahoo::{YahooProvider, DEFAULT_BASE as YAHOO_BASE};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Core Data Types
// ============================================================================

/// Price adjustment convention applied by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMode {
    /// Forward-adjusted (前复权)
    #[default]
    Qfq,
    /// Backward-adjusted (后复权)
    Hfq,
    /// Unadjusted
    None,
}

impl AdjustMode {
    /// Parse from the query-string form. The empty string means unadjusted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "qfq" => Some(Self::Qfq),
            "hfq" => Some(Self::Hfq),
            "none" | "" => Some(Self::None),
            _ => None,
        }
    }

    /// Wire name used by the query string and providers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qfq => "qfq",
            Self::Hfq => "hfq",
            Self::None => "none",
        }
    }
}

impl fmt::Display for AdjustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One trading day's OHLCV record plus turnover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Trading date
    pub date: NaiveDate,
    /// Opening price
    pub open: f64,
    /// Closing price
    pub close: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Traded volume
    pub volume: f64,
    /// Turnover rate (%)
    pub turnover: f64,
    /// `volume * turnover`
    #[serde(default)]
    pub volume_turnover_product: f64,
}

impl Bar {
    /// Distance from the top of the body to the high.
    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    /// Distance from the bottom of the body to the low.
    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Daily amplitude as a percentage of the open.
    pub fn price_range(&self) -> f64 {
        (self.high - self.low) / self.open * 100.0
    }
}

/// An ordered daily series for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySeries {
    /// Symbol as requested
    pub symbol: String,
    /// Requested start date
    pub start_date: NaiveDate,
    /// Requested end date
    pub end_date: NaiveDate,
    /// Adjustment mode
    pub adjust: AdjustMode,
    /// Provider that answered, or `synthetic`
    pub source: String,
    /// Bars sorted ascending by date
    #[serde(rename = "data")]
    pub bars: Vec<Bar>,
}

impl HistorySeries {
    /// True when the series was synthesized after a deadline expiry.
    pub fn is_synthetic(&self) -> bool {
        self.source == SYNTHETIC_SOURCE
    }
}

/// A raw provider row before normalization.
///
/// Providers that lack a column leave it `None`; normalization fills it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    pub turnover: Option<f64>,
}

/// Basic descriptive information about a listed stock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockBasic {
    pub symbol: String,
    pub name: String,
    pub industry: String,
    pub area: String,
    pub market: String,
}

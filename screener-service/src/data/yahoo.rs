//! Yahoo Finance adapter (overseas history source).
//!
//! Reads daily bars from the v8 chart API. The payload is columnar with nulls
//! on non-trading days; timestamps are shifted by the exchange `gmtoffset`
//! before taking the date. Adjustment mode is not applied by this source.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::provider::{retry_after, HistoryProvider, HistoryQuery, ProviderError};
use super::RawRow;

/// Yahoo chart host
pub const DEFAULT_BASE: &str = "https://query2.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

fn day_start_ts(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// Exchange-local trading date of a bar timestamp, `None` when out of range.
fn local_date(ts: i64, gmtoffset: i64) -> Option<NaiveDate> {
    let local = ts.checked_add(gmtoffset)?;
    DateTime::from_timestamp(local, 0).map(|dt| dt.date_naive())
}

/// Convert a chart payload into raw rows. Bars missing any OHLC value are dropped.
fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<RawRow>, ProviderError> {
    let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
        Some(err) if err.code == "Not Found" => {
            ProviderError::DataNotAvailable(format!("{}: {}", symbol, err.description))
        }
        Some(err) => ProviderError::Internal(format!("{}: {}", err.code, err.description)),
        None => ProviderError::Internal("empty result with no error".into()),
    })?;

    let data = result
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::DataNotAvailable(format!("No chart for {}", symbol)))?;

    let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Internal("no quote data".into()))?;

    let at = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();

    let mut rows = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        let Some(date) = local_date(ts, offset) else {
            continue;
        };

        rows.push(RawRow {
            date,
            open: Some(open),
            close: Some(close),
            high: Some(high),
            low: Some(low),
            volume: at(&quote.volume, i),
            turnover: None,
        });
    }
    Ok(rows)
}

/// Yahoo Finance adapter for daily history.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
}

impl YahooProvider {
    /// Create a provider against the public endpoint.
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE, timeout)
    }

    /// Create a provider against a custom host.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl HistoryProvider for YahooProvider {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        let ticker = query.symbol.to_uppercase();
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let params = [
            ("period1", day_start_ts(query.start).to_string()),
            // Inclusive end: request through the following midnight
            ("period2", (day_start_ts(query.end) + 86_400).to_string()),
            ("interval", "1d".to_string()),
        ];

        debug!(symbol = %ticker, "Fetching chart from yahoo");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!("Unknown ticker {}", ticker)));
        }
        if !response.status().is_success() {
            return Err(ProviderError::from_status(
                response.status(),
                retry_after(&response),
            ));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

        parse_chart(&ticker, body)
    }
}

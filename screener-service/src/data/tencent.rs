//! Tencent adapter (secondary history source).
//!
//! The `fqkline` endpoint covers A-share, Hong Kong and US codes with a
//! market prefix (`sh600000`, `hk00700`, `usAAPL`). Rows carry no turnover
//! column, so turnover is left for normalization to fill.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::provider::{retry_after, HistoryProvider, HistoryQuery, ProviderError};
use super::{AdjustMode, RawRow};
use crate::symbol::{exchange_for_code, has_market_prefix, is_alphabetic_ticker};

/// Tencent quote host
pub const DEFAULT_BASE: &str = "https://web.ifzq.gtimg.cn";

/// Maximum rows requested per call
const MAX_ROWS: usize = 2000;

/// Map a symbol to Tencent's prefixed code.
fn to_tencent_code(symbol: &str) -> Option<String> {
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    if has_market_prefix(symbol) {
        return Some(symbol.to_string());
    }
    if is_digits(symbol) {
        return match symbol.len() {
            5 => Some(format!("hk{}", symbol)),
            6 => Some(format!("{}{}", exchange_for_code(symbol), symbol)),
            _ => None,
        };
    }
    if is_alphabetic_ticker(symbol) {
        return Some(format!("us{}", symbol.to_uppercase()));
    }
    None
}

/// True when a full page came back that stops short of the requested start.
fn is_truncated(rows: &[RawRow], start: NaiveDate) -> bool {
    rows.len() >= MAX_ROWS
        && rows
            .iter()
            .map(|r| r.date)
            .min()
            .is_some_and(|first| first > start)
}

fn adjust_param(adjust: AdjustMode) -> &'static str {
    match adjust {
        AdjustMode::Qfq => "qfq",
        AdjustMode::Hfq => "hfq",
        AdjustMode::None => "",
    }
}

fn cell_f64(cell: Option<&Value>) -> Option<f64> {
    match cell? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse one `[date, open, close, high, low, volume, ...]` row.
fn parse_row(row: &Value) -> Option<RawRow> {
    let cells = row.as_array()?;
    let date = NaiveDate::parse_from_str(cells.first()?.as_str()?, "%Y-%m-%d").ok()?;

    Some(RawRow {
        date,
        open: cell_f64(cells.get(1)),
        close: cell_f64(cells.get(2)),
        high: cell_f64(cells.get(3)),
        low: cell_f64(cells.get(4)),
        volume: cell_f64(cells.get(5)),
        turnover: None,
    })
}

/// Extract rows for `code` from a `fqkline` payload.
fn parse_payload(payload: &Value, code: &str) -> Result<Vec<RawRow>, ProviderError> {
    let entry = payload
        .get("data")
        .and_then(|d| d.get(code))
        .filter(|e| e.is_object())
        .ok_or_else(|| ProviderError::DataNotAvailable(format!("No data for {}", code)))?;

    let rows = ["qfqday", "hfqday", "day"]
        .iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_array))
        .ok_or_else(|| ProviderError::DataNotAvailable(format!("No daily rows for {}", code)))?;

    Ok(rows.iter().filter_map(parse_row).collect())
}

/// Tencent adapter for daily history.
pub struct TencentProvider {
    client: reqwest::Client,
    base_url: String,
}

impl TencentProvider {
    /// Create a provider against the public endpoint.
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_BASE, timeout)
    }

    /// Create a provider against a custom host.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl HistoryProvider for TencentProvider {
    fn name(&self) -> &'static str {
        "tencent"
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        let code = to_tencent_code(&query.symbol).ok_or_else(|| {
            ProviderError::InvalidRequest(format!("Unsupported symbol: {}", query.symbol))
        })?;

        let param = format!(
            "{},day,{},{},{},{}",
            code,
            query.start.format("%Y-%m-%d"),
            query.end.format("%Y-%m-%d"),
            MAX_ROWS,
            adjust_param(query.adjust),
        );
        let url = format!("{}/appstock/app/fqkline/get", self.base_url);

        debug!(symbol = %query.symbol, code = %code, "Fetching kline from tencent");

        let response = self
            .client
            .get(&url)
            .query(&[("param", param)])
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::from_status(
                response.status(),
                retry_after(&response),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))?;

        let rows = parse_payload(&payload, &code)?;
        if is_truncated(&rows, query.start) {
            debug!(
                symbol = %query.symbol,
                rows = rows.len(),
                requested_start = %query.start,
                "Tencent row limit reached, earlier history not returned"
            );
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_to_tencent_code() {
        assert_eq!(to_tencent_code("sh600000").as_deref(), Some("sh600000"));
        assert_eq!(to_tencent_code("hk00700").as_deref(), Some("hk00700"));
        assert_eq!(to_tencent_code("00700").as_deref(), Some("hk00700"));
        assert_eq!(to_tencent_code("600000").as_deref(), Some("sh600000"));
        assert_eq!(to_tencent_code("000001").as_deref(), Some("sz000001"));
        assert_eq!(to_tencent_code("aapl").as_deref(), Some("usAAPL"));
        assert_eq!(to_tencent_code("1234"), None);
        assert_eq!(to_tencent_code("BRK.B"), None);
    }

    #[test]
    fn test_parse_payload_prefers_adjusted_rows() {
        let payload = json!({
            "code": 0,
            "data": {"sz000001": {
                "qfqday": [
                    ["2024-01-02", "9.39", "9.21", "9.42", "9.21", "1158366.000"],
                    ["2024-01-03", "9.19", "9.20", "9.22", "9.15", "733610.000", {"nd": "2023"}]
                ]
            }}
        });
        let rows = parse_payload(&payload, "sz000001").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].close, Some(9.21));
        assert_eq!(rows[1].volume, Some(733_610.0));
        assert!(rows.iter().all(|r| r.turnover.is_none()));
    }

    #[test]
    fn test_full_page_short_of_start_is_truncated() {
        let first = NaiveDate::from_ymd_opt(2016, 1, 4).unwrap();
        let rows: Vec<RawRow> = (0..MAX_ROWS as i64)
            .map(|i| RawRow {
                date: first + chrono::Duration::days(i),
                ..RawRow::default()
            })
            .collect();

        assert!(is_truncated(&rows, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()));
        assert!(!is_truncated(&rows, first));
        assert!(!is_truncated(&rows[..10], NaiveDate::from_ymd_opt(1990, 1, 1).unwrap()));
    }

    #[test]
    fn test_parse_payload_missing_symbol() {
        let payload = json!({"code": 0, "data": {"sz000001": "param error"}});
        assert!(matches!(
            parse_payload(&payload, "sz000001"),
            Err(ProviderError::DataNotAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_query_mock_server() {
        let server = MockServer::start().await;
        Mock::given(path("/appstock/app/fqkline/get"))
            .and(query_param(
                "param",
                "hk00700,day,2024-01-01,2024-01-31,2000,qfq",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "data": {"hk00700": {"day": [["2024-01-02", "296.0", "292.6", "297.4", "290.2", "14950000"]]}}
            })))
            .mount(&server)
            .await;

        let provider = TencentProvider::with_base_url(server.uri(), Duration::from_secs(5));
        let rows = provider
            .query(&HistoryQuery {
                symbol: "00700".into(),
                start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                adjust: AdjustMode::Qfq,
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].high, Some(297.4));
    }
}

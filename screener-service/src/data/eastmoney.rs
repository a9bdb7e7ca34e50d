//! Eastmoney adapter for domestic A-share data.
//!
//! Primary history source and the market directory (stock metadata and listings).
//!
//! # Endpoints
//! - Daily K-line: push2his.eastmoney.com `/api/qt/stock/kline/get`
//! - Quote metadata: push2.eastmoney.com `/api/qt/stock/get`
//! - Market listing: push2.eastmoney.com `/api/qt/clist/get`

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{retry_after, HistoryProvider, HistoryQuery, MarketDirectory, ProviderError};
use super::{AdjustMode, RawRow, StockBasic};
use crate::symbol::{exchange_for_code, market_label};

// ============================================================================
// Constants
// ============================================================================

/// Eastmoney historical data host
pub const DEFAULT_HISTORY_BASE: &str = "https://push2his.eastmoney.com";

/// Eastmoney real-time host
pub const DEFAULT_QUOTE_BASE: &str = "https://push2.eastmoney.com";

/// Daily K-line period
const KLT_DAILY: i32 = 101;

/// Listing page size; one page covers every board
const LIST_PAGE_SIZE: usize = 5000;

/// Board filters for the market listing
const FS_CN: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23";
const FS_HK: &str = "m:128 t:3,m:128 t:4,m:128 t:1,m:128 t:2";
const FS_US: &str = "m:105,m:106,m:107";

// ============================================================================
// Symbol Mapping
// ============================================================================

/// Convert a symbol to eastmoney's `secid` form.
///
/// `sh600000` -> `1.600000`, `sz000001` -> `0.000001`; a bare six-digit code
/// takes its exchange from the leading digit.
fn to_secid(symbol: &str) -> Option<String> {
    let (exchange, code) = if let Some(code) = symbol.strip_prefix("sh") {
        ("sh", code)
    } else if let Some(code) = symbol.strip_prefix("sz") {
        ("sz", code)
    } else {
        (exchange_for_code(symbol), symbol)
    };

    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let market = match exchange {
        "sh" => "1",
        _ => "0",
    };
    Some(format!("{}.{}", market, code))
}

/// Convert an adjust mode to the `fqt` parameter.
fn adjust_to_fqt(adjust: AdjustMode) -> i32 {
    match adjust {
        AdjustMode::None => 0,
        AdjustMode::Qfq => 1,
        AdjustMode::Hfq => 2,
    }
}

fn parse_field(value: Option<&&str>) -> Option<f64> {
    value.and_then(|v| v.trim().parse::<f64>().ok())
}

/// Parse one K-line string.
///
/// Layout: `date,open,close,high,low,volume,amount,amplitude,pct,chg,turnover`.
fn parse_kline(line: &str) -> Option<RawRow> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 6 {
        return None;
    }
    let date = NaiveDate::parse_from_str(parts[0].trim(), "%Y-%m-%d").ok()?;

    Some(RawRow {
        date,
        open: parse_field(parts.get(1)),
        close: parse_field(parts.get(2)),
        high: parse_field(parts.get(3)),
        low: parse_field(parts.get(4)),
        volume: parse_field(parts.get(5)),
        turnover: parse_field(parts.get(10)),
    })
}

// ============================================================================
// Eastmoney Provider
// ============================================================================

/// Eastmoney adapter for daily history and market metadata.
pub struct EastmoneyProvider {
    client: reqwest::Client,
    history_base: String,
    quote_base: String,
}

impl EastmoneyProvider {
    /// Create a provider against the public endpoints.
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_urls(DEFAULT_HISTORY_BASE, DEFAULT_QUOTE_BASE, timeout)
    }

    /// Create a provider against custom hosts.
    pub fn with_base_urls(
        history_base: impl Into<String>,
        quote_base: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)")
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            history_base: history_base.into().trim_end_matches('/').to_string(),
            quote_base: quote_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        if !response.status().is_success() {
            return Err(ProviderError::from_status(
                response.status(),
                retry_after(&response),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }

    /// Fetch daily K-lines.
    async fn fetch_kline(&self, query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        let secid = to_secid(&query.symbol).ok_or_else(|| {
            ProviderError::InvalidRequest(format!("Unsupported symbol: {}", query.symbol))
        })?;

        let url = format!("{}/api/qt/stock/kline/get", self.history_base);
        let params = [
            ("secid", secid),
            ("klt", KLT_DAILY.to_string()),
            ("fqt", adjust_to_fqt(query.adjust).to_string()),
            ("beg", query.start.format("%Y%m%d").to_string()),
            ("end", query.end.format("%Y%m%d").to_string()),
            ("lmt", "1000000".to_string()),
            ("fields1", "f1,f2,f3,f4,f5,f6".to_string()),
            (
                "fields2",
                "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61".to_string(),
            ),
        ];

        debug!(symbol = %query.symbol, adjust = %query.adjust, "Fetching kline from eastmoney");

        let data: KlineResponse = self.get_json(&url, &params).await?;

        let klines = data.data.and_then(|d| d.klines).ok_or_else(|| {
            ProviderError::DataNotAvailable(format!("No kline data for {}", query.symbol))
        })?;

        let mut rows = Vec::with_capacity(klines.len());
        for line in &klines {
            match parse_kline(line) {
                Some(row) => rows.push(row),
                None => warn!(line = %line, "Invalid kline format, skipping"),
            }
        }
        Ok(rows)
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

#[async_trait]
impl HistoryProvider for EastmoneyProvider {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        self.fetch_kline(query).await
    }
}

#[async_trait]
impl MarketDirectory for EastmoneyProvider {
    async fn stock_basic(&self, symbol: &str) -> Result<StockBasic, ProviderError> {
        let secid = to_secid(symbol)
            .ok_or_else(|| ProviderError::InvalidRequest(format!("Unsupported symbol: {}", symbol)))?;

        let url = format!("{}/api/qt/stock/get", self.quote_base);
        let params = [
            ("secid", secid),
            ("fields", "f57,f58,f127,f128".to_string()),
        ];
        let response: QuoteResponse = self.get_json(&url, &params).await?;
        let data = response
            .data
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("No quote for {}", symbol)))?;

        Ok(StockBasic {
            symbol: symbol.to_string(),
            name: data.name.unwrap_or_default(),
            industry: data.industry.unwrap_or_default(),
            area: data.area.unwrap_or_default(),
            market: market_label(symbol).to_string(),
        })
    }

    async fn list_symbols(
        &self,
        market: &str,
        exchange: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        let fs = match market {
            "cn" => FS_CN,
            "hk" => FS_HK,
            "us" => FS_US,
            _ => return Ok(Vec::new()),
        };

        let url = format!("{}/api/qt/clist/get", self.quote_base);
        let params = [
            ("pn", "1".to_string()),
            ("pz", LIST_PAGE_SIZE.to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f12".to_string()),
            ("fs", fs.to_string()),
            ("fields", "f12,f14".to_string()),
        ];
        let response: ListResponse = self.get_json(&url, &params).await?;
        let codes = response
            .data
            .map(|d| d.diff)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|item| item.code);

        let symbols = match market {
            "cn" => {
                let keep = exchange_filter(exchange);
                codes.filter(|code| keep(code)).collect()
            }
            "hk" => codes.map(|code| format!("hk{}", code)).collect(),
            _ => codes.collect(),
        };
        Ok(symbols)
    }
}

/// Code predicate for an A-share exchange filter.
fn exchange_filter(exchange: Option<&str>) -> fn(&String) -> bool {
    match exchange.map(str::to_lowercase).as_deref() {
        Some("sh") | Some("shanghai") => |code| code.starts_with('6'),
        Some("sz") | Some("shenzhen") => |code| code.starts_with('0') || code.starts_with('3'),
        _ => |_| true,
    }
}

// ============================================================================
// Eastmoney API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct KlineResponse {
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    klines: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(rename = "f58")]
    name: Option<String>,
    #[serde(rename = "f127")]
    industry: Option<String>,
    #[serde(rename = "f128")]
    area: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: Option<ListData>,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    diff: Vec<ListItem>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    #[serde(rename = "f12")]
    code: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> EastmoneyProvider {
        EastmoneyProvider::with_base_urls(server.uri(), server.uri(), Duration::from_secs(5))
    }

    fn query(symbol: &str) -> HistoryQuery {
        HistoryQuery {
            symbol: symbol.into(),
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            adjust: AdjustMode::Qfq,
        }
    }

    #[test]
    fn test_to_secid() {
        assert_eq!(to_secid("sh600000"), Some("1.600000".to_string()));
        assert_eq!(to_secid("sz000001"), Some("0.000001".to_string()));
        assert_eq!(to_secid("600519"), Some("1.600519".to_string()));
        assert_eq!(to_secid("300750"), Some("0.300750".to_string()));
        assert_eq!(to_secid("AAPL"), None);
        assert_eq!(to_secid("hk00700"), None);
        assert_eq!(to_secid("shsh600000"), None);
    }

    #[test]
    fn test_adjust_to_fqt() {
        assert_eq!(adjust_to_fqt(AdjustMode::None), 0);
        assert_eq!(adjust_to_fqt(AdjustMode::Qfq), 1);
        assert_eq!(adjust_to_fqt(AdjustMode::Hfq), 2);
    }

    #[test]
    fn test_parse_kline() {
        let row = parse_kline("2024-01-02,10.50,10.80,10.90,10.40,1000000,10500000,4.7,2.8,0.3,1.25")
            .unwrap();
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(row.open, Some(10.5));
        assert_eq!(row.close, Some(10.8));
        assert_eq!(row.high, Some(10.9));
        assert_eq!(row.low, Some(10.4));
        assert_eq!(row.volume, Some(1_000_000.0));
        assert_eq!(row.turnover, Some(1.25));

        let short = parse_kline("2024-01-02,10.50,10.80,10.90,10.40,1000000").unwrap();
        assert_eq!(short.turnover, None);

        assert!(parse_kline("garbage").is_none());
        assert!(parse_kline("2024-13-40,1,1,1,1,1").is_none());
    }

    #[tokio::test]
    async fn test_fetch_kline_from_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/qt/stock/kline/get"))
            .and(query_param("secid", "1.600000"))
            .and(query_param("klt", "101"))
            .and(query_param("fqt", "1"))
            .and(query_param("beg", "20240101"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rc": 0,
                "data": {
                    "code": "600000",
                    "klines": [
                        "2024-01-02,7.00,7.10,7.15,6.95,300000,2100000,2.8,1.4,0.1,0.10",
                        "2024-01-03,7.10,7.05,7.12,7.01,250000,1760000,1.5,-0.7,-0.05,0.08"
                    ]
                }
            })))
            .mount(&server)
            .await;

        let rows = provider(&server).query(&query("sh600000")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].close, Some(7.05));
        assert_eq!(rows[0].turnover, Some(0.10));
    }

    #[tokio::test]
    async fn test_null_data_is_not_available() {
        let server = MockServer::start().await;
        Mock::given(path("/api/qt/stock/kline/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"rc": 0, "data": null})))
            .mount(&server)
            .await;

        let err = provider(&server).query(&query("sz000001")).await.unwrap_err();
        assert!(matches!(err, ProviderError::DataNotAvailable(_)));
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let server = MockServer::start().await;
        Mock::given(path("/api/qt/stock/kline/get"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let err = provider(&server).query(&query("sz000001")).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(12)
            }
        );
    }

    #[tokio::test]
    async fn test_unmappable_symbol_is_rejected_without_request() {
        let server = MockServer::start().await;
        let err = provider(&server).query(&query("AAPL")).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_stock_basic() {
        let server = MockServer::start().await;
        Mock::given(path("/api/qt/stock/get"))
            .and(query_param("secid", "1.600000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rc": 0,
                "data": {"f57": "600000", "f58": "浦发银行", "f127": "银行", "f128": "上海板块"}
            })))
            .mount(&server)
            .await;

        let basic = provider(&server).stock_basic("sh600000").await.unwrap();
        assert_eq!(basic.name, "浦发银行");
        assert_eq!(basic.industry, "银行");
        assert_eq!(basic.area, "上海板块");
        assert_eq!(basic.market, "A股");
    }

    #[tokio::test]
    async fn test_list_symbols_with_exchange_filter() {
        let server = MockServer::start().await;
        Mock::given(path("/api/qt/clist/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rc": 0,
                "data": {"total": 4, "diff": [
                    {"f12": "600000", "f14": "浦发银行"},
                    {"f12": "000001", "f14": "平安银行"},
                    {"f12": "300750", "f14": "宁德时代"},
                    {"f12": "688981", "f14": "中芯国际"}
                ]}
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        let sh = p.list_symbols("cn", Some("shanghai")).await.unwrap();
        assert_eq!(sh, vec!["600000", "688981"]);

        let sz = p.list_symbols("cn", Some("SZ")).await.unwrap();
        assert_eq!(sz, vec!["000001", "300750"]);

        let all = p.list_symbols("cn", None).await.unwrap();
        assert_eq!(all.len(), 4);

        let hk = p.list_symbols("hk", None).await.unwrap();
        assert_eq!(hk[0], "hk600000");

        assert!(p.list_symbols("jp", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_live_daily_history() {
        let provider = EastmoneyProvider::new(Duration::from_secs(30));
        let rows = provider.query(&query("sh600000")).await.unwrap();
        assert!(!rows.is_empty());
    }
}

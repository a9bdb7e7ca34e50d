//! HTTP surface exercised through the router with fake components.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Datelike, Duration as Days, NaiveDate, Weekday};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use screener_common::Config;
use screener_service::ai::{AiConfig, CompletionError, CompletionProvider};
use screener_service::data::{
    HistoryProvider, HistoryQuery, MarketDirectory, ProviderError, RawRow, StockBasic,
};
use screener_service::{build_router, ScreenerState};

// ============================================================================
// Fakes
// ============================================================================

/// 25 weekday bars for any symbol except `*999999`.
struct FixedHistory;

#[async_trait]
impl HistoryProvider for FixedHistory {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        if query.symbol.ends_with("999999") {
            return Ok(Vec::new());
        }
        let mut date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut rows = Vec::new();
        while rows.len() < 25 {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                rows.push(RawRow {
                    date,
                    open: Some(10.0),
                    close: Some(10.2),
                    high: Some(10.5),
                    low: Some(9.8),
                    volume: Some(1_500_000.0),
                    turnover: Some(0.8),
                });
            }
            date += Days::days(1);
        }
        Ok(rows)
    }
}

struct FixedDirectory;

#[async_trait]
impl MarketDirectory for FixedDirectory {
    async fn stock_basic(&self, symbol: &str) -> Result<StockBasic, ProviderError> {
        if symbol == "sh600000" {
            Ok(StockBasic {
                symbol: symbol.into(),
                name: "浦发银行".into(),
                industry: "银行".into(),
                area: "上海".into(),
                market: "A股".into(),
            })
        } else {
            Err(ProviderError::DataNotAvailable(format!("no basic info for {}", symbol)))
        }
    }

    async fn list_symbols(
        &self,
        market: &str,
        _exchange: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(match market {
            "cn" => (0..250).map(|i| format!("sh{}", 600000 + i)).collect(),
            _ => Vec::new(),
        })
    }
}

/// Always returns the same trade verdict.
struct EagerModel;

#[async_trait]
impl CompletionProvider for EagerModel {
    async fn complete(&self, _config: &AiConfig, _prompt: &str) -> Result<String, CompletionError> {
        Ok(r#"{"action": "买入", "trend": "上涨", "logic": "突破", "will_trade": true, "confidence": 0.7}"#.to_string())
    }
}

fn app_with(config: Config) -> Router {
    let history: Arc<dyn HistoryProvider> = Arc::new(FixedHistory);
    let state = ScreenerState::with_components(
        config,
        history.clone(),
        history.clone(),
        history,
        Arc::new(FixedDirectory),
        Arc::new(EagerModel),
    );
    build_router(Arc::new(state))
}

fn app() -> Router {
    app_with(Config::default())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header("content-length", body.len())
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn assert_invalid(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

// ============================================================================
// Service
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let (status, body) = get(app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_root_info() {
    let (status, body) = get(app(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "stock-screener");
}

// ============================================================================
// Stock Data
// ============================================================================

#[tokio::test]
async fn test_history_returns_series_and_features() {
    let (status, body) = get(
        app(),
        "/api/v1/stock/history?symbol=sh600000&start_date=2024-01-01&end_date=2024-02-29",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "sh600000");
    assert_eq!(body["source"], "fixed");
    assert_eq!(body["adjust"], "qfq");
    assert_eq!(body["start_date"], "2024-01-01");
    assert_eq!(body["data"].as_array().map(Vec::len), Some(25));
    assert!(body["features"]["avg_volume_long"].is_object());
}

#[tokio::test]
async fn test_history_validation() {
    let (status, body) = get(app(), "/api/v1/stock/history").await;
    assert_invalid(status, &body);

    let (status, body) = get(app(), "/api/v1/stock/history?symbol=sh600000&adjust=bogus").await;
    assert_invalid(status, &body);

    let (status, body) =
        get(app(), "/api/v1/stock/history?symbol=sh600000&start_date=20240101").await;
    assert_invalid(status, &body);
}

#[tokio::test]
async fn test_history_unknown_symbol_is_404() {
    let (status, body) = get(app(), "/api/v1/stock/history?symbol=sh999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SYMBOL_NOT_FOUND");
}

#[tokio::test]
async fn test_basic_info() {
    let (status, body) = get(app(), "/api/v1/stock/basic?symbol=sh600000").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "浦发银行");

    let (status, _) = get(app(), "/api/v1/stock/basic?symbol=sz000002").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_symbols_are_capped() {
    let (status, body) = get(app(), "/api/v1/stock/symbols?market=cn").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 200);
    assert_eq!(body["market"], "cn");

    let (_, body) = get(app(), "/api/v1/stock/symbols?market=mars").await;
    assert_eq!(body["total"], 0);
}

// ============================================================================
// Screening
// ============================================================================

#[tokio::test]
async fn test_rule_screen_echoes_request() {
    let (status, body) = post(
        app(),
        "/api/v1/screening/rule",
        r#"{"symbols": ["sh600000"], "rules": [{"indicator": "close", "operator": ">", "value": 1e9}]}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
    assert_eq!(body["request"]["market"], "cn");
}

#[tokio::test]
async fn test_ai_screen_rejects_blank_query() {
    let (status, body) = post(app(), "/api/v1/screening/ai", r#"{"query": "  "}"#).await;
    assert_invalid(status, &body);
}

#[tokio::test]
async fn test_ai_screen_with_strategy() {
    let (status, body) = post(
        app(),
        "/api/v1/screening/ai",
        r#"{"query": "趋势突破", "symbols": ["sh600000", "sz000001"], "strategy": {"risk_preference": "low"}}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["analysis_results"][0]["will_trade"], true);
    assert!(body["explanation"].is_string());
}

// ============================================================================
// AI
// ============================================================================

#[tokio::test]
async fn test_analyze_requires_complete_config() {
    let (status, body) = post(app(), "/api/v1/ai/analyze", r#"{"symbol": "sh600000"}"#).await;
    assert_invalid(status, &body);
    assert!(body["error"]["message"]
        .as_str()
        .is_some_and(|m| m.contains("API密钥")));
}

#[tokio::test]
async fn test_analyze_with_client_history() {
    let request = serde_json::json!({
        "symbol": "sh600000",
        "ai_config": {"api_key": "sk-test", "api_url": "http://localhost:1/v1", "ai_model": "m"},
        "history_data": [
            {"date": "2024-01-05", "open": 10.0, "close": 10.4, "high": 10.6, "low": 9.9, "volume": 100.0, "turnover": 1.0},
            {"date": "2024-01-06", "open": 10.4, "close": 10.5, "high": 10.7, "low": 10.3, "volume": 120.0},
            {"date": "2024-01-08", "open": 10.5, "close": 10.9, "high": 11.0, "low": 10.4, "volume": 150.0, "turnover": 1.2}
        ]
    });
    let (status, body) = post(app(), "/api/v1/ai/analyze", &request.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["symbol"], "sh600000");
    assert_eq!(body["will_trade"], true);
    assert_eq!(body["action"], "买入");
}

#[tokio::test]
async fn test_analyze_rejects_weekend_only_history() {
    let request = serde_json::json!({
        "symbol": "sh600000",
        "ai_config": {"api_key": "sk-test"},
        "history_data": [{"date": "2024-01-06", "close": 10.0}]
    });
    let (status, body) = post(app(), "/api/v1/ai/analyze", &request.to_string()).await;
    assert_invalid(status, &body);
}

#[tokio::test]
async fn test_explain_validation() {
    let (status, body) = post(app(), "/api/v1/ai/explain", r#"{"total": 1}"#).await;
    assert_invalid(status, &body);

    let (status, body) = post(app(), "/api/v1/ai/explain?query=why", "").await;
    assert_invalid(status, &body);

    let (status, body) = post(
        app(),
        "/api/v1/ai/explain?query=why&ai_config=not-json",
        r#"{"total": 1}"#,
    )
    .await;
    assert_invalid(status, &body);
}

#[tokio::test]
async fn test_explain_returns_text() {
    let (status, body) = post(
        app(),
        "/api/v1/ai/explain?query=why&ai_config=%7B%22ai_model%22%3A%22m%22%7D",
        r#"{"total": 1, "stocks": [{"symbol": "sh600000"}]}"#,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["explanation"]
        .as_str()
        .is_some_and(|e| e.contains("will_trade")));
}

#[tokio::test]
async fn test_connection_endpoint() {
    let (status, body) = post(app(), "/api/v1/ai/test-connection", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["response"].as_str().is_some_and(|r| r.ends_with("...")));

    let (status, body) = post(
        app(),
        "/api/v1/ai/test-connection",
        r#"{"ai_config": {"api_key": "sk-other"}}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_body_limit() {
    let mut config = Config::default();
    config.server.max_body_bytes = 64;
    let big = format!(r#"{{"query": "{}"}}"#, "x".repeat(256));

    let (status, _) = post(app_with(config), "/api/v1/screening/ai", &big).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

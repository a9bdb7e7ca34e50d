//! HTTP routes for the screener service.

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use screener_common::Error;

use crate::ai::{AiConfigPatch, ConnectionStatus, StrategyConfig, StrategyVerdict};
use crate::data::{listed_symbols, normalize_rows, AdjustMode, HistorySeries, RawRow, StockBasic};
use crate::error::ApiError;
use crate::features::{compute_features, FeatureSet};
use crate::screener::{AiScreenRequest, AiScreenResult, RuleScreenRequest, RuleScreenResult};
use crate::ScreenerState;

const SERVICE_NAME: &str = "stock-screener";

// ============================================================================
// Request Types
// ============================================================================

/// Query string for `GET /api/v1/stock/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub symbol: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub adjust: Option<String>,
}

/// Query string for `GET /api/v1/stock/basic`.
#[derive(Debug, Default, Deserialize)]
pub struct BasicParams {
    pub symbol: Option<String>,
}

fn default_market() -> String {
    "cn".to_string()
}

/// Query string for `GET /api/v1/stock/symbols`.
#[derive(Debug, Deserialize)]
pub struct SymbolsParams {
    #[serde(default = "default_market")]
    pub market: String,
    pub exchange: Option<String>,
}

/// Body of `POST /api/v1/ai/analyze`.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub ai_config: Option<AiConfigPatch>,
    /// Bars supplied by the client; used instead of fetching.
    #[serde(default)]
    pub history_data: Option<Vec<RawRow>>,
}

/// Query string for `POST /api/v1/ai/explain`.
#[derive(Debug, Default, Deserialize)]
pub struct ExplainParams {
    pub query: Option<String>,
    /// JSON-encoded [`AiConfigPatch`]
    pub ai_config: Option<String>,
}

/// Body of `POST /api/v1/ai/test-connection`: either `{"ai_config": {...}}`
/// or the patch itself.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConnectionBody {
    Wrapped { ai_config: AiConfigPatch },
    Bare(AiConfigPatch),
}

impl ConnectionBody {
    fn into_patch(self) -> AiConfigPatch {
        match self {
            Self::Wrapped { ai_config } => ai_config,
            Self::Bare(patch) => patch,
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub version: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// History series with the features of its last bar.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    #[serde(flatten)]
    pub series: HistorySeries,
    pub features: FeatureSet,
}

#[derive(Debug, Serialize)]
pub struct SymbolsResponse {
    pub market: String,
    pub total: usize,
    pub symbols: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::invalid(format!("{} must be YYYY-MM-DD, got '{}'", field, s))),
    }
}

fn required_symbol(symbol: Option<&str>) -> Result<String, ApiError> {
    match symbol.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ApiError::invalid("symbol is required")),
    }
}

// ============================================================================
// Service Routes
// ============================================================================

/// Service information
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Stock history, features and rule/AI screening".to_string(),
    })
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

// ============================================================================
// Stock Data Routes
// ============================================================================

/// Daily history plus derived features
pub async fn get_history(
    State(state): State<Arc<ScreenerState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let symbol = required_symbol(params.symbol.as_deref())?;
    let start = parse_date("start_date", params.start_date.as_deref())?;
    let end = parse_date("end_date", params.end_date.as_deref())?;
    let adjust = match params.adjust.as_deref() {
        None => AdjustMode::default(),
        Some(raw) => AdjustMode::parse(raw).ok_or_else(|| {
            ApiError::invalid(format!("adjust must be qfq, hfq or none, got '{}'", raw))
        })?,
    };

    let series = state.fetcher.fetch(&symbol, start, end, adjust).await?;
    let features = compute_features(&series.bars);

    Ok(Json(HistoryResponse { series, features }))
}

/// Name, industry and area of one stock
pub async fn get_basic(
    State(state): State<Arc<ScreenerState>>,
    Query(params): Query<BasicParams>,
) -> Result<Json<StockBasic>, ApiError> {
    let symbol = required_symbol(params.symbol.as_deref())?;
    let basic = state
        .directory
        .stock_basic(&symbol)
        .await
        .map_err(Error::from)?;

    Ok(Json(basic))
}

/// Listed symbols for a market
pub async fn get_symbols(
    State(state): State<Arc<ScreenerState>>,
    Query(params): Query<SymbolsParams>,
) -> Result<Json<SymbolsResponse>, ApiError> {
    let symbols = listed_symbols(
        state.directory.as_ref(),
        &params.market,
        params.exchange.as_deref(),
    )
    .await
    .map_err(Error::from)?;

    Ok(Json(SymbolsResponse {
        market: params.market,
        total: symbols.len(),
        symbols,
    }))
}

// ============================================================================
// Screening Routes
// ============================================================================

/// Deterministic rule screening
pub async fn rule_screen(
    State(state): State<Arc<ScreenerState>>,
    Json(request): Json<RuleScreenRequest>,
) -> Result<Json<RuleScreenResult>, ApiError> {
    let result = state.screening.rule_screen(request).await?;
    Ok(Json(result))
}

/// AI-assisted screening
pub async fn ai_screen(
    State(state): State<Arc<ScreenerState>>,
    Json(request): Json<AiScreenRequest>,
) -> Result<Json<AiScreenResult>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::invalid("query must not be empty"));
    }

    let result = state.screening.ai_screen(&state.base_ai, request).await?;
    Ok(Json(result))
}

// ============================================================================
// AI Routes
// ============================================================================

/// Strategy-aware verdict for one symbol
pub async fn analyze(
    State(state): State<Arc<ScreenerState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<StrategyVerdict>, ApiError> {
    let symbol = required_symbol(Some(&request.symbol))?;
    let config = state.base_ai.with_patch(request.ai_config.as_ref());
    config.validate()?;

    let bars = match request.history_data {
        Some(rows) => {
            let bars = normalize_rows(rows);
            if bars.is_empty() {
                return Err(ApiError::invalid("history_data contains no usable bars"));
            }
            tracing::debug!(symbol = %symbol, bars = bars.len(), "Using client-supplied history");
            bars
        }
        None => {
            let (start, end) = state
                .screening
                .resolve_dates(request.start_date, request.end_date);
            state
                .fetcher
                .fetch(&symbol, Some(start), Some(end), AdjustMode::default())
                .await?
                .bars
        }
    };

    let features = compute_features(&bars);
    let strategy = request.strategy.unwrap_or_default();
    let verdict = state
        .analyzer
        .analyze_with_strategy(&config, &symbol, &features, &bars, &strategy)
        .await;

    Ok(Json(verdict))
}

/// Narrative explanation of a screening result
pub async fn explain(
    State(state): State<Arc<ScreenerState>>,
    Query(params): Query<ExplainParams>,
    body: Bytes,
) -> Result<Json<ExplainResponse>, ApiError> {
    let query = params.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::invalid("query must not be empty"));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::invalid("screening result body must not be empty"));
    }
    let result: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid(format!("screening result is not valid JSON: {}", e)))?;
    if result.is_null() || result.as_object().is_some_and(|o| o.is_empty()) {
        return Err(ApiError::invalid("screening result body must not be empty"));
    }

    let patch = match params.ai_config.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            serde_json::from_str::<AiConfigPatch>(raw)
                .map_err(|e| ApiError::invalid(format!("ai_config is not valid JSON: {}", e)))?,
        ),
    };
    let config = state.base_ai.with_patch(patch.as_ref());

    let explanation = state.analyzer.explain(&config, &result, query).await;
    Ok(Json(ExplainResponse { explanation }))
}

/// Probe the completion endpoint
pub async fn test_connection(
    State(state): State<Arc<ScreenerState>>,
    body: Bytes,
) -> Result<Json<ConnectionStatus>, ApiError> {
    let patch = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let parsed: Option<ConnectionBody> = serde_json::from_slice(&body)
            .map_err(|e| ApiError::invalid(format!("ai_config is not valid JSON: {}", e)))?;
        parsed.map(ConnectionBody::into_patch)
    };
    let config = state.base_ai.with_patch(patch.as_ref());

    Ok(Json(state.analyzer.test_connection(&config).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("start_date", None).unwrap(), None);
        assert_eq!(parse_date("start_date", Some(" ")).unwrap(), None);
        assert_eq!(
            parse_date("start_date", Some("2024-03-01")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert!(parse_date("start_date", Some("2024/03/01")).is_err());
    }

    #[test]
    fn test_required_symbol() {
        assert_eq!(required_symbol(Some(" sh600000 ")).unwrap(), "sh600000");
        assert!(required_symbol(Some("")).is_err());
        assert!(required_symbol(None).is_err());
    }

    #[test]
    fn test_connection_body_shapes() {
        let wrapped: ConnectionBody =
            serde_json::from_str(r#"{"ai_config": {"api_key": "k"}}"#).unwrap();
        assert_eq!(wrapped.into_patch().api_key.as_deref(), Some("k"));

        let bare: ConnectionBody = serde_json::from_str(r#"{"ai_model": "m"}"#).unwrap();
        assert_eq!(bare.into_patch().model_name.as_deref(), Some("m"));
    }
}

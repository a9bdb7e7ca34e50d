//! Stock Screener Service
//!
//! Daily stock history with a bounded-time provider fallback chain, rolling
//! window features, and two screening modes: deterministic rules evaluated
//! against the latest bar, and LLM-assisted judgments with an aggregate
//! explanation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    screener-service (axum)                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  symbol ─▶ fetcher ─▶ features ─▶ screener ─┬─ rules             │
//! │              │                              └─ ai (completion)   │
//! │              ▼                                                   │
//! │  data: eastmoney │ tencent │ yahoo │ synthetic                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Degradation
//!
//! - History fetches never block past the deadline; a synthetic random walk
//!   stands in when providers are too slow.
//! - Unparseable model output becomes a conservative default verdict.
//! - One symbol's failure never aborts a screening batch.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod ai;
pub mod data;
pub mod error;
pub mod features;
pub mod fetcher;
pub mod routes;
pub mod screener;
pub mod symbol;

use anyhow::Result;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use screener_common::config::Config;

use crate::ai::{AiAnalyzer, AiConfig, CompletionProvider, OpenAiCompatibleClient, RiskProfileCatalog};
use crate::data::{
    EastmoneyProvider, HistoryProvider, MarketDirectory, TencentProvider, YahooProvider,
    EASTMONEY_HISTORY_BASE, EASTMONEY_QUOTE_BASE, TENCENT_BASE, YAHOO_BASE,
};
use crate::fetcher::HistoryFetcher;
use crate::screener::ScreeningService;

/// Shared, read-only service state.
pub struct ScreenerState {
    /// Configuration
    pub config: Config,
    /// Deadline-bounded history fetcher
    pub fetcher: HistoryFetcher,
    /// Stock metadata and listings
    pub directory: Arc<dyn MarketDirectory>,
    /// Per-symbol AI judgments
    pub analyzer: AiAnalyzer,
    /// Rule and AI screening batches
    pub screening: ScreeningService,
    /// AI settings every request starts from
    pub base_ai: AiConfig,
}

impl ScreenerState {
    /// Build state backed by the public market-data and completion endpoints.
    pub fn new(config: Config) -> Self {
        let timeout = Duration::from_secs(config.data.provider_timeout_secs);
        let data = &config.data;

        let eastmoney = Arc::new(EastmoneyProvider::with_base_urls(
            data.primary_history_url.as_deref().unwrap_or(EASTMONEY_HISTORY_BASE),
            data.primary_quote_url.as_deref().unwrap_or(EASTMONEY_QUOTE_BASE),
            timeout,
        ));
        let tencent = Arc::new(TencentProvider::with_base_url(
            data.secondary_url.as_deref().unwrap_or(TENCENT_BASE),
            timeout,
        ));
        let yahoo = Arc::new(YahooProvider::with_base_url(
            data.overseas_url.as_deref().unwrap_or(YAHOO_BASE),
            timeout,
        ));

        Self::with_components(
            config,
            eastmoney.clone(),
            tencent,
            yahoo,
            eastmoney,
            Arc::new(OpenAiCompatibleClient::new()),
        )
    }

    /// Build state from explicit providers.
    pub fn with_components(
        config: Config,
        primary: Arc<dyn HistoryProvider>,
        secondary: Arc<dyn HistoryProvider>,
        overseas: Arc<dyn HistoryProvider>,
        directory: Arc<dyn MarketDirectory>,
        completion: Arc<dyn CompletionProvider>,
    ) -> Self {
        let fetcher = HistoryFetcher::new(primary, secondary, overseas)
            .with_deadline(Duration::from_secs(config.data.fetch_deadline_secs));

        let profiles = Arc::new(RiskProfileCatalog::from_dir(
            config.ai.risk_profiles_dir.as_deref(),
        ));
        let analyzer = AiAnalyzer::new(completion, profiles);

        let screening = ScreeningService::new(
            fetcher.clone(),
            Arc::clone(&directory),
            analyzer.clone(),
            config.data.default_symbols.clone(),
            config.data.default_history_days,
        );

        let base_ai = AiConfig::from_settings(&config.ai);
        if let Err(e) = base_ai.validate() {
            tracing::warn!(error = %e, "AI settings incomplete; requests must supply ai_config");
        }

        Self {
            config,
            fetcher,
            directory,
            analyzer,
            screening,
            base_ai,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Build the HTTP router over shared state.
pub fn build_router(state: Arc<ScreenerState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(RequestBodyLimitLayer::new(state.config.server.max_body_bytes))
        .layer(cors_layer(&state.config.server.cors_origins));

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        // Stock data
        .route("/api/v1/stock/history", get(routes::get_history))
        .route("/api/v1/stock/basic", get(routes::get_basic))
        .route("/api/v1/stock/symbols", get(routes::get_symbols))
        // Screening
        .route("/api/v1/screening/rule", post(routes::rule_screen))
        .route("/api/v1/screening/ai", post(routes::ai_screen))
        // AI analysis
        .route("/api/v1/ai/analyze", post(routes::analyze))
        .route("/api/v1/ai/explain", post(routes::explain))
        .route("/api/v1/ai/test-connection", post(routes::test_connection))
        .layer(middleware)
        .with_state(state)
}

/// Main screener service
pub struct ScreenerService {
    state: Arc<ScreenerState>,
}

impl ScreenerService {
    /// Create a service backed by the public endpoints
    pub fn new(config: Config) -> Self {
        Self {
            state: Arc::new(ScreenerState::new(config)),
        }
    }

    /// Create a service from prepared state
    pub fn from_state(state: Arc<ScreenerState>) -> Self {
        Self { state }
    }

    /// Bind and serve until the process exits
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self.state.config.server.bind_addr().parse()?;
        let app = build_router(Arc::clone(&self.state));

        tracing::info!(address = %addr, "Starting HTTP server");
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

//! Batch screening: deterministic rule matching and AI-assisted matching.
//!
//! Both modes resolve a candidate universe, cap it, and walk it sequentially
//! in input order. A symbol whose history cannot be fetched is logged and
//! dropped; it never aborts the batch.

pub mod rules;

pub use rules::{matches, Comparison, Indicator, ScreeningRule};

use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use screener_common::logging::generate_trace_id;
use screener_common::Result;

use crate::ai::{AiAnalyzer, AiConfig, AiConfigPatch, ScreeningVerdict, StrategyConfig, StrategyVerdict};
use crate::data::{listed_symbols, AdjustMode, MarketDirectory, StockBasic};
use crate::features::compute_features;
use crate::fetcher::HistoryFetcher;
use crate::symbol::market_label;

/// Candidate cap for rule screening.
pub const RULE_SCREEN_CAP: usize = 50;

/// Candidate cap for AI screening (one completion call per symbol).
pub const AI_SCREEN_CAP: usize = 30;

fn default_market() -> String {
    "cn".to_string()
}

// ============================================================================
// Requests and Results
// ============================================================================

/// Rule screening request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleScreenRequest {
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub rules: Vec<ScreeningRule>,
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default)]
    pub exchange: Option<String>,
}

/// AI screening request.
#[derive(Debug, Clone, Deserialize)]
pub struct AiScreenRequest {
    pub query: String,
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub ai_config: Option<AiConfigPatch>,
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub convert_rules: bool,
}

/// One matched stock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedStock {
    pub symbol: String,
    pub name: String,
    pub industry: String,
    pub market: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_warning: Option<String>,
}

impl MatchedStock {
    fn from_basic(basic: StockBasic) -> Self {
        Self {
            symbol: basic.symbol,
            name: basic.name,
            industry: basic.industry,
            market: basic.market,
            analysis: None,
            risk_warning: None,
        }
    }
}

/// Rule screening outcome echoing its request.
#[derive(Debug, Clone, Serialize)]
pub struct RuleScreenResult {
    pub total: usize,
    pub stocks: Vec<MatchedStock>,
    pub request: RuleScreenRequest,
}

/// Per-symbol AI verdict in either mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Judgment {
    Condition(ScreeningVerdict),
    Strategy(StrategyVerdict),
}

impl Judgment {
    /// Whether the verdict selects the symbol.
    pub fn is_match(&self) -> bool {
        match self {
            Self::Condition(v) => v.meets_conditions,
            Self::Strategy(v) => v.will_trade,
        }
    }

    /// `(analysis, risk_warning)` shown with a matched stock.
    pub fn summary(&self) -> (String, String) {
        match self {
            Self::Condition(v) => (v.analysis_reason.clone(), v.risk_warning.clone()),
            Self::Strategy(v) => (
                format!("{} / {}: {}", v.action, v.trend, v.logic),
                format!(
                    "置信度 {:.2}，支撑 {}，压力 {}",
                    v.confidence, v.support_level, v.resistance_level
                ),
            ),
        }
    }
}

/// AI screening outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AiScreenResult {
    pub total: usize,
    pub stocks: Vec<MatchedStock>,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ScreeningRule>>,
    pub explanation: String,
    pub analysis_results: Vec<Judgment>,
    /// Symbols judged on a synthesized series after the fetch deadline
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub synthetic_symbols: Vec<String>,
}

// ============================================================================
// Screening Service
// ============================================================================

/// Runs rule and AI screening batches.
#[derive(Clone)]
pub struct ScreeningService {
    fetcher: HistoryFetcher,
    directory: Arc<dyn MarketDirectory>,
    analyzer: AiAnalyzer,
    default_symbols: Vec<String>,
    default_history_days: i64,
}

impl ScreeningService {
    pub fn new(
        fetcher: HistoryFetcher,
        directory: Arc<dyn MarketDirectory>,
        analyzer: AiAnalyzer,
        default_symbols: Vec<String>,
        default_history_days: i64,
    ) -> Self {
        Self {
            fetcher,
            directory,
            analyzer,
            default_symbols,
            default_history_days,
        }
    }

    /// Resolve `(start, end)`: end defaults to today, start to
    /// `end - default_history_days`.
    pub fn resolve_dates(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> (NaiveDate, NaiveDate) {
        let end = end.unwrap_or_else(|| Local::now().date_naive());
        let start = start.unwrap_or_else(|| end - Duration::days(self.default_history_days));
        (start, end)
    }

    /// Explicit symbols, else the market listing, else the configured
    /// defaults; truncated to `cap`.
    pub async fn resolve_universe(
        &self,
        symbols: Option<&[String]>,
        market: &str,
        exchange: Option<&str>,
        cap: usize,
    ) -> Vec<String> {
        let explicit: Vec<String> = symbols
            .unwrap_or_default()
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut universe = if !explicit.is_empty() {
            explicit
        } else {
            match listed_symbols(self.directory.as_ref(), market, exchange).await {
                Ok(list) if !list.is_empty() => list,
                Ok(_) => {
                    warn!(market, "Market listing is empty, using default symbols");
                    self.default_symbols.clone()
                }
                Err(e) => {
                    warn!(market, error = %e, "Market listing failed, using default symbols");
                    self.default_symbols.clone()
                }
            }
        };
        universe.truncate(cap);
        universe
    }

    /// Basic info, degrading to empty fields plus the classified market.
    pub async fn basic_or_degraded(&self, symbol: &str) -> StockBasic {
        match self.directory.stock_basic(symbol).await {
            Ok(basic) => basic,
            Err(e) => {
                debug!(symbol, error = %e, "Basic info unavailable, using placeholder");
                StockBasic {
                    symbol: symbol.to_string(),
                    market: market_label(symbol).to_string(),
                    ..StockBasic::default()
                }
            }
        }
    }

    /// Match `request.rules` against the latest bar of each candidate.
    pub async fn rule_screen(&self, request: RuleScreenRequest) -> Result<RuleScreenResult> {
        let run_id = generate_trace_id();
        let (start, end) = self.resolve_dates(request.start_date, request.end_date);
        let universe = self
            .resolve_universe(
                request.symbols.as_deref(),
                &request.market,
                request.exchange.as_deref(),
                RULE_SCREEN_CAP,
            )
            .await;

        info!(
            run_id = %run_id,
            candidates = universe.len(),
            rules = request.rules.len(),
            "Rule screening started"
        );

        let mut stocks = Vec::new();
        for symbol in &universe {
            let series = match self
                .fetcher
                .fetch(symbol, Some(start), Some(end), AdjustMode::default())
                .await
            {
                Ok(series) => series,
                Err(e) => {
                    warn!(run_id = %run_id, symbol = %symbol, error = %e, "Skipping symbol");
                    continue;
                }
            };

            if matches(&series.bars, &request.rules) {
                let basic = self.basic_or_degraded(symbol).await;
                stocks.push(MatchedStock::from_basic(basic));
            }
        }

        info!(run_id = %run_id, matched = stocks.len(), "Rule screening finished");
        Ok(RuleScreenResult {
            total: stocks.len(),
            stocks,
            request,
        })
    }

    /// Ask the model to judge each candidate and explain the aggregate.
    pub async fn ai_screen(&self, base: &AiConfig, request: AiScreenRequest) -> Result<AiScreenResult> {
        let run_id = generate_trace_id();
        let config = base.with_patch(request.ai_config.as_ref());
        let (start, end) = self.resolve_dates(request.start_date, request.end_date);
        let universe = self
            .resolve_universe(
                request.symbols.as_deref(),
                &request.market,
                request.exchange.as_deref(),
                AI_SCREEN_CAP,
            )
            .await;

        info!(
            run_id = %run_id,
            candidates = universe.len(),
            strategy = request.strategy.is_some(),
            model = %config.model_name,
            "AI screening started"
        );

        let rules = if request.convert_rules {
            Some(self.analyzer.convert_rules(&config, &request.query).await)
        } else {
            None
        };

        let mut stocks = Vec::new();
        let mut analysis_results = Vec::new();
        let mut synthetic_symbols = Vec::new();
        for symbol in &universe {
            let series = match self
                .fetcher
                .fetch(symbol, Some(start), Some(end), AdjustMode::default())
                .await
            {
                Ok(series) => series,
                Err(e) => {
                    warn!(run_id = %run_id, symbol = %symbol, error = %e, "Skipping symbol");
                    continue;
                }
            };
            debug!(run_id = %run_id, symbol = %symbol, stage = "fetched", bars = series.bars.len());
            if series.is_synthetic() {
                warn!(run_id = %run_id, symbol = %symbol, "Judging on synthetic history");
                synthetic_symbols.push(symbol.clone());
            }

            let basic = self.basic_or_degraded(symbol).await;
            let features = compute_features(&series.bars);
            debug!(run_id = %run_id, symbol = %symbol, stage = "featurized");

            let judgment = match &request.strategy {
                Some(strategy) => Judgment::Strategy(
                    self.analyzer
                        .analyze_with_strategy(&config, symbol, &features, &series.bars, strategy)
                        .await,
                ),
                None => Judgment::Condition(
                    self.analyzer
                        .judge(&config, symbol, &features, &series.bars, &request.query)
                        .await,
                ),
            };

            if judgment.is_match() {
                let (analysis, risk_warning) = judgment.summary();
                let mut stock = MatchedStock::from_basic(basic);
                stock.analysis = Some(analysis);
                stock.risk_warning = Some(risk_warning);
                stocks.push(stock);
            }
            analysis_results.push(judgment);
        }

        let aggregate = serde_json::json!({
            "total": stocks.len(),
            "stocks": &stocks,
            "request": {
                "query": &request.query,
                "symbols": &universe,
                "start_date": start,
                "end_date": end,
                "market": &request.market,
            },
        });
        let explanation = self.analyzer.explain(&config, &aggregate, &request.query).await;

        info!(run_id = %run_id, matched = stocks.len(), "AI screening finished");
        Ok(AiScreenResult {
            total: stocks.len(),
            stocks,
            query: request.query,
            rules,
            explanation,
            analysis_results,
            synthetic_symbols,
        })
    }
}

//! Per-symbol AI judgments and aggregate explanations.
//!
//! Judgments never fail: completion errors and undecodable output both turn
//! into conservative default verdicts. Each call binds the config snapshot it
//! was given, so later config updates cannot reach an in-flight judgment.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use screener_common::util::truncate_with_ellipsis;

use super::client::CompletionProvider;
use super::config::AiConfig;
use super::errors::ErrorCategory;
use super::parse::{
    parse_rules, parse_screening_verdict, parse_strategy_verdict, ScreeningVerdict,
    StrategyVerdict,
};
use super::profiles::{bias_text, trend_sensitivity_text, RiskLevel, RiskProfileCatalog};
use super::prompts::{self, StrategyPrompt};
use crate::data::Bar;
use crate::features::FeatureSet;
use crate::screener::rules::ScreeningRule;

/// Bars sent with a condition judgment.
pub const CONDITION_BARS: usize = 10;

/// Bars sent with a strategy judgment.
pub const STRATEGY_BARS: usize = 30;

/// Characters of the probe reply echoed back.
const PROBE_ECHO_CHARS: usize = 50;

fn default_level() -> String {
    "medium".to_string()
}

fn default_bias() -> String {
    "neutral".to_string()
}

/// Trading strategy parameters for strategy-aware judgments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_level")]
    pub risk_preference: String,

    #[serde(default = "default_level")]
    pub trend_sensitivity: String,

    #[serde(default = "default_bias")]
    pub bias: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            risk_preference: default_level(),
            trend_sensitivity: default_level(),
            bias: default_bias(),
        }
    }
}

/// Result of a connectivity probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

fn recent(bars: &[Bar], n: usize) -> &[Bar] {
    &bars[bars.len().saturating_sub(n)..]
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Runs AI judgments against a completion capability.
#[derive(Clone)]
pub struct AiAnalyzer {
    completion: Arc<dyn CompletionProvider>,
    profiles: Arc<RiskProfileCatalog>,
}

impl AiAnalyzer {
    pub fn new(completion: Arc<dyn CompletionProvider>, profiles: Arc<RiskProfileCatalog>) -> Self {
        Self {
            completion,
            profiles,
        }
    }

    /// Judge whether `symbol` meets a natural-language condition.
    pub async fn judge(
        &self,
        config: &AiConfig,
        symbol: &str,
        features: &FeatureSet,
        bars: &[Bar],
        condition: &str,
    ) -> ScreeningVerdict {
        let window = recent(bars, CONDITION_BARS);
        let prompt = prompts::condition_prompt(
            symbol,
            &to_json(features),
            &to_json(window),
            window.len(),
            condition,
        );

        info!(symbol, model = %config.model_name, stage = "prompted", "Requesting condition judgment");
        match self.completion.complete(config, &prompt).await {
            Ok(text) => parse_screening_verdict(symbol, &text),
            Err(e) => {
                warn!(symbol, error = %e, "Condition judgment failed");
                ScreeningVerdict::failed(symbol, &e.to_string())
            }
        }
    }

    /// Strategy-aware judgment parameterized by a risk persona.
    pub async fn analyze_with_strategy(
        &self,
        config: &AiConfig,
        symbol: &str,
        features: &FeatureSet,
        bars: &[Bar],
        strategy: &StrategyConfig,
    ) -> StrategyVerdict {
        let level = RiskLevel::parse(&strategy.risk_preference);
        let profile = self.profiles.get(level);
        let window = recent(bars, STRATEGY_BARS);
        let features_json = to_json(features);
        let bars_json = to_json(window);

        let prompt = prompts::strategy_prompt(&StrategyPrompt {
            symbol,
            features_json: &features_json,
            bars_json: &bars_json,
            days: window.len(),
            persona: &profile.description,
            trend_text: trend_sensitivity_text(&strategy.trend_sensitivity),
            bias_text: bias_text(&strategy.bias),
            risk_preference: level.as_str(),
            trend_sensitivity: &strategy.trend_sensitivity,
            bias: &strategy.bias,
        });

        info!(
            symbol,
            model = %config.model_name,
            risk = level.key(),
            stage = "prompted",
            "Requesting strategy judgment"
        );
        match self.completion.complete(config, &prompt).await {
            Ok(text) => parse_strategy_verdict(symbol, &text),
            Err(e) => {
                let message = e.to_string();
                let category = ErrorCategory::classify(&message);
                warn!(symbol, error = %e, category = ?category, "Strategy judgment failed");
                StrategyVerdict::hold(symbol, category.describe(config, &message))
            }
        }
    }

    /// Narrative explanation of an aggregate result.
    pub async fn explain(&self, config: &AiConfig, result: &serde_json::Value, query: &str) -> String {
        let prompt = prompts::explain_prompt(query, &to_json(result));
        match self.completion.complete(config, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Explanation request failed");
                format!("AI模型调用失败: {}. 无法获取完整分析结果。", e)
            }
        }
    }

    /// Convert a natural-language query to rules. Failures yield no rules.
    pub async fn convert_rules(&self, config: &AiConfig, query: &str) -> Vec<ScreeningRule> {
        match self.completion.complete(config, &prompts::rules_prompt(query)).await {
            Ok(text) => parse_rules(&text),
            Err(e) => {
                warn!(error = %e, "Rule conversion failed");
                Vec::new()
            }
        }
    }

    /// Send the probe prompt and report whether the endpoint answered.
    pub async fn test_connection(&self, config: &AiConfig) -> ConnectionStatus {
        match self.completion.complete(config, prompts::PROBE_PROMPT).await {
            Ok(text) => ConnectionStatus {
                success: true,
                message: "AI模型连接成功".to_string(),
                response: Some(truncate_with_ellipsis(&text, PROBE_ECHO_CHARS)),
            },
            Err(e) => {
                warn!(error = %truncate_with_ellipsis(&e.to_string(), 200), "AI connection test failed");
                ConnectionStatus {
                    success: false,
                    message: format!("AI模型连接失败: {}", e),
                    response: None,
                }
            }
        }
    }
}

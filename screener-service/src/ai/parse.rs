//! Tolerant decoding of model output into structured verdicts.
//!
//! Decoding runs three stages in order: the text as-is, the widest
//! brace-delimited span, and the text with code-fence markers stripped.
//! When all three fail the caller receives a conservative default verdict
//! carrying a prefix of the raw text; a parse failure never escapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use screener_common::util::truncate_with_ellipsis;

use crate::screener::rules::ScreeningRule;

/// Characters of raw output kept in a default verdict.
const RAW_PREFIX_CHARS: usize = 100;

/// Which decoding stage produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Direct,
    DelimitedSpan,
    FenceStripped,
}

impl DecodeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::DelimitedSpan => "delimited_span",
            Self::FenceStripped => "fence_stripped",
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let mut s = text.trim();
    for opener in ["```json", "```JSON", "```"] {
        if let Some(rest) = s.strip_prefix(opener) {
            s = rest;
            break;
        }
    }
    s.strip_suffix("```").unwrap_or(s).trim()
}

fn delimited_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn decode(
    text: &str,
    open: char,
    close: char,
    accept: fn(&Value) -> bool,
) -> Option<(Value, DecodeStage)> {
    let attempt = |candidate: &str| {
        serde_json::from_str::<Value>(candidate)
            .ok()
            .filter(|v| accept(v))
    };

    if let Some(v) = attempt(text.trim()) {
        return Some((v, DecodeStage::Direct));
    }
    if let Some(v) = delimited_span(text, open, close).and_then(attempt) {
        return Some((v, DecodeStage::DelimitedSpan));
    }
    attempt(strip_fences(text)).map(|v| (v, DecodeStage::FenceStripped))
}

/// Decode a JSON object from model output.
pub fn decode_json_object(text: &str) -> Option<(Value, DecodeStage)> {
    decode(text, '{', '}', Value::is_object)
}

/// Decode a JSON array from model output.
pub fn decode_json_array(text: &str) -> Option<(Value, DecodeStage)> {
    decode(text, '[', ']', Value::is_array)
}

// ============================================================================
// Field helpers
// ============================================================================

fn text_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn number_field(v: &Value, key: &str) -> Option<f64> {
    let n = match v.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
}

fn bool_field(v: &Value, key: &str) -> Option<bool> {
    match v.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "是" => Some(true),
            "false" | "no" | "否" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn raw_prefix(raw: &str) -> String {
    let prefix: String = raw.chars().take(RAW_PREFIX_CHARS).collect();
    format!("{}...", prefix)
}

// ============================================================================
// Condition verdict
// ============================================================================

/// Outcome of a natural-language condition judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningVerdict {
    pub stock: String,
    pub meets_conditions: bool,
    pub analysis_reason: String,
    pub risk_warning: String,
}

impl ScreeningVerdict {
    /// Conservative verdict used when the output cannot be decoded.
    pub fn unparseable(symbol: &str, raw: &str) -> Self {
        Self {
            stock: symbol.to_string(),
            meets_conditions: false,
            analysis_reason: format!("AI分析结果解析失败，原始输出: {}", raw_prefix(raw)),
            risk_warning: "无法获取有效分析结果".to_string(),
        }
    }

    /// Verdict used when the completion call itself failed.
    pub fn failed(symbol: &str, error: &str) -> Self {
        Self {
            stock: symbol.to_string(),
            meets_conditions: false,
            analysis_reason: format!("AI模型调用失败: {}. 无法获取完整分析结果。", error),
            risk_warning: "无法获取有效分析结果".to_string(),
        }
    }

    fn from_value(symbol: &str, v: &Value) -> Self {
        Self {
            stock: text_field(v, "stock").unwrap_or_else(|| symbol.to_string()),
            meets_conditions: bool_field(v, "meets_conditions").unwrap_or(false),
            analysis_reason: text_field(v, "analysis_reason").unwrap_or_default(),
            risk_warning: text_field(v, "risk_warning").unwrap_or_default(),
        }
    }
}

/// Parse a condition verdict, degrading to [`ScreeningVerdict::unparseable`].
pub fn parse_screening_verdict(symbol: &str, raw: &str) -> ScreeningVerdict {
    match decode_json_object(raw) {
        Some((value, stage)) => {
            debug!(symbol, stage = stage.as_str(), "Decoded condition verdict");
            ScreeningVerdict::from_value(symbol, &value)
        }
        None => {
            warn!(symbol, raw = %truncate_with_ellipsis(raw, RAW_PREFIX_CHARS), "Condition verdict was not valid JSON");
            ScreeningVerdict::unparseable(symbol, raw)
        }
    }
}

// ============================================================================
// Strategy verdict
// ============================================================================

/// A cited historical analogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPattern {
    pub pattern_date: String,
    pub kline_segment: String,
    pub result: String,
    #[serde(rename = "return")]
    pub return_pct: f64,
    pub similarity: f64,
}

impl HistoricalPattern {
    fn from_value(v: &Value) -> Option<Self> {
        if !v.is_object() {
            return None;
        }
        Some(Self {
            pattern_date: text_field(v, "pattern_date").unwrap_or_default(),
            kline_segment: text_field(v, "kline_segment").unwrap_or_default(),
            result: text_field(v, "result").unwrap_or_default(),
            return_pct: number_field(v, "return").unwrap_or(0.0),
            similarity: number_field(v, "similarity").unwrap_or(0.0).clamp(0.0, 1.0),
        })
    }
}

/// Per-dimension commentary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedAnalysis {
    pub price_analysis: String,
    pub volume_analysis: String,
    pub turnover_analysis: String,
    pub volume_turnover_analysis: String,
    pub kline_pattern_analysis: String,
    pub support_resistance_analysis: String,
}

impl DetailedAnalysis {
    fn from_value(v: &Value) -> Self {
        let field = |key: &str| text_field(v, key).unwrap_or_default();
        Self {
            price_analysis: field("price_analysis"),
            volume_analysis: field("volume_analysis"),
            turnover_analysis: field("turnover_analysis"),
            volume_turnover_analysis: field("volume_turnover_analysis"),
            kline_pattern_analysis: field("kline_pattern_analysis"),
            support_resistance_analysis: field("support_resistance_analysis"),
        }
    }
}

/// Outcome of a strategy-aware judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyVerdict {
    pub symbol: String,
    pub action: String,
    pub trend: String,
    pub logic: String,
    pub confidence: f64,
    pub expected_return: f64,
    pub will_trade: bool,
    pub support_level: String,
    pub resistance_level: String,
    pub historical_similar_patterns: Vec<HistoricalPattern>,
    pub detailed_analysis: DetailedAnalysis,
}

const DEFAULT_ACTION: &str = "持有";
const DEFAULT_TREND: &str = "震荡";

impl StrategyVerdict {
    /// Hold / sideways / zero confidence with the given reasoning.
    pub fn hold(symbol: &str, logic: String) -> Self {
        Self {
            symbol: symbol.to_string(),
            action: DEFAULT_ACTION.to_string(),
            trend: DEFAULT_TREND.to_string(),
            logic,
            confidence: 0.0,
            expected_return: 0.0,
            will_trade: false,
            support_level: String::new(),
            resistance_level: String::new(),
            historical_similar_patterns: Vec::new(),
            detailed_analysis: DetailedAnalysis::default(),
        }
    }

    /// Conservative verdict used when the output cannot be decoded.
    pub fn unparseable(symbol: &str, raw: &str) -> Self {
        Self::hold(
            symbol,
            format!("AI分析结果解析失败，原始输出: {}", raw_prefix(raw)),
        )
    }

    fn from_value(symbol: &str, v: &Value) -> Self {
        let patterns = v
            .get("historical_similar_patterns")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(HistoricalPattern::from_value).collect())
            .unwrap_or_default();

        let detailed = v
            .get("detailed_analysis")
            .map(DetailedAnalysis::from_value)
            .unwrap_or_default();

        Self {
            symbol: text_field(v, "symbol").unwrap_or_else(|| symbol.to_string()),
            action: text_field(v, "action")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ACTION.to_string()),
            trend: text_field(v, "trend")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TREND.to_string()),
            logic: text_field(v, "logic").unwrap_or_default(),
            confidence: number_field(v, "confidence").unwrap_or(0.0).clamp(0.0, 1.0),
            expected_return: number_field(v, "expected_return")
                .unwrap_or(0.0)
                .clamp(-1.0, 1.0),
            will_trade: bool_field(v, "will_trade").unwrap_or(false),
            support_level: text_field(v, "support_level").unwrap_or_default(),
            resistance_level: text_field(v, "resistance_level").unwrap_or_default(),
            historical_similar_patterns: patterns,
            detailed_analysis: detailed,
        }
    }
}

/// Parse a strategy verdict, degrading to [`StrategyVerdict::unparseable`].
pub fn parse_strategy_verdict(symbol: &str, raw: &str) -> StrategyVerdict {
    match decode_json_object(raw) {
        Some((value, stage)) => {
            debug!(symbol, stage = stage.as_str(), "Decoded strategy verdict");
            StrategyVerdict::from_value(symbol, &value)
        }
        None => {
            warn!(symbol, raw = %truncate_with_ellipsis(raw, RAW_PREFIX_CHARS), "Strategy verdict was not valid JSON");
            StrategyVerdict::unparseable(symbol, raw)
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

fn rule_from_value(v: &Value) -> Option<ScreeningRule> {
    let indicator = text_field(v, "indicator")?;
    let operator = text_field(v, "operator")?;
    let value = number_field(v, "value")?;
    Some(ScreeningRule::new(indicator.trim(), operator.trim(), value))
}

/// Parse a rule list. Output that is not an array yields no rules; array
/// elements missing a field are dropped.
pub fn parse_rules(raw: &str) -> Vec<ScreeningRule> {
    match decode_json_array(raw) {
        Some((Value::Array(items), stage)) => {
            debug!(stage = stage.as_str(), count = items.len(), "Decoded rule list");
            items.iter().filter_map(rule_from_value).collect()
        }
        _ => {
            warn!(raw = %truncate_with_ellipsis(raw, RAW_PREFIX_CHARS), "Rule conversion output was not a JSON array");
            Vec::new()
        }
    }
}

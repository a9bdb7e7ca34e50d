//! Boolean rule evaluation against the latest bar of a series.

use serde::{Deserialize, Serialize};

use crate::data::Bar;

/// One `indicator operator value` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRule {
    pub indicator: String,
    pub operator: String,
    pub value: f64,
}

impl ScreeningRule {
    pub fn new(indicator: impl Into<String>, operator: impl Into<String>, value: f64) -> Self {
        Self {
            indicator: indicator.into(),
            operator: operator.into(),
            value,
        }
    }
}

/// Bar fields a rule can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Open,
    Close,
    High,
    Low,
    Volume,
    Turnover,
}

impl Indicator {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "close" => Some(Self::Close),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "volume" => Some(Self::Volume),
            "turnover" => Some(Self::Turnover),
            _ => None,
        }
    }

    pub fn read(&self, bar: &Bar) -> f64 {
        match self {
            Self::Open => bar.open,
            Self::Close => bar.close,
            Self::High => bar.high,
            Self::Low => bar.low,
            Self::Volume => bar.volume,
            Self::Turnover => bar.turnover,
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
}

impl Comparison {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "==" => Some(Self::Eq),
            _ => None,
        }
    }

    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
        }
    }
}

/// Evaluate `rules` as a conjunction against the last bar.
///
/// An empty series never matches. Rules naming an unknown indicator or
/// operator are skipped and do not affect the result.
pub fn matches(bars: &[Bar], rules: &[ScreeningRule]) -> bool {
    let Some(latest) = bars.last() else {
        return false;
    };

    for rule in rules {
        let (Some(indicator), Some(op)) = (
            Indicator::parse(&rule.indicator),
            Comparison::parse(&rule.operator),
        ) else {
            continue;
        };
        if !op.holds(indicator.read(latest), rule.value) {
            return false;
        }
    }
    true
}

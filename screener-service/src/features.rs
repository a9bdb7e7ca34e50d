//! Rolling-window features anchored to the last bar of a series.
//!
//! Windows longer than the available history yield `None` (rendered as
//! `null`) instead of a value computed from a truncated window.

use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use statrs::statistics::Statistics;

use crate::data::Bar;

const SHORT_VOLUME_WINDOW: usize = 5;
const LONG_VOLUME_WINDOW: usize = 20;
const TURNOVER_WINDOW: usize = 10;
const VOLATILITY_WINDOW: usize = 5;
const CONSOLIDATION_WINDOW: usize = 10;

/// Relative standard deviation (%) below which a bar counts as consolidating.
const CONSOLIDATION_THRESHOLD_PCT: f64 = 3.0;

/// Denominator guard for ratios.
const EPSILON: f64 = 0.01;

/// Derived indicators for the last bar of one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub avg_volume_short: Option<f64>,
    pub avg_volume_long: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub turnover_mean: Option<f64>,
    pub price_range: Option<f64>,
    pub kline_shadow_ratio: Option<f64>,
    pub consolidation_days: usize,
    pub volatility_trend: Option<f64>,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Mean of the last `window` values, or `None` if fewer are available.
fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    finite(values[values.len() - window..].iter().mean())
}

/// Whether the `CONSOLIDATION_WINDOW` closes ending at `end` are range-bound.
fn is_consolidating(closes: &[f64], end: usize) -> bool {
    if end + 1 < CONSOLIDATION_WINDOW {
        return false;
    }
    let window = &closes[end + 1 - CONSOLIDATION_WINDOW..=end];
    let mean = window.iter().mean();
    let std = window.iter().std_dev();
    let pct = std / mean * 100.0;
    pct.is_finite() && pct < CONSOLIDATION_THRESHOLD_PCT
}

/// Length of the run of consecutive consolidating bars ending at the last bar.
fn consolidation_days(closes: &[f64]) -> usize {
    let mut run = 0;
    for i in 0..closes.len() {
        if is_consolidating(closes, i) {
            run += 1;
        } else {
            run = 0;
        }
    }
    run
}

/// Compute the feature set for a series sorted ascending by date.
pub fn compute_features(bars: &[Bar]) -> FeatureSet {
    let Some(last) = bars.last() else {
        return FeatureSet::default();
    };

    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let turnovers: Vec<f64> = bars.iter().map(|b| b.turnover).collect();
    let ranges: Vec<f64> = bars.iter().map(Bar::price_range).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let avg_volume_short = trailing_mean(&volumes, SHORT_VOLUME_WINDOW);
    let avg_volume_long = trailing_mean(&volumes, LONG_VOLUME_WINDOW);
    let volume_ratio = match (avg_volume_short, avg_volume_long) {
        (Some(short), Some(long)) => finite(short / (long + EPSILON)),
        _ => None,
    };

    FeatureSet {
        avg_volume_short,
        avg_volume_long,
        volume_ratio,
        turnover_mean: trailing_mean(&turnovers, TURNOVER_WINDOW),
        price_range: finite(last.price_range()),
        kline_shadow_ratio: finite(last.upper_shadow() / (last.lower_shadow() + EPSILON)),
        consolidation_days: consolidation_days(&closes),
        volatility_trend: trailing_mean(&ranges, VOLATILITY_WINDOW),
    }
}

// ============================================================================
// Serialization
// ============================================================================

struct Described<T> {
    value: T,
    description: &'static str,
}

impl<T: Serialize> Serialize for Described<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Feature", 2)?;
        s.serialize_field("value", &self.value)?;
        s.serialize_field("description", self.description)?;
        s.end()
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let floats = [
            ("avg_volume_short", self.avg_volume_short, "短期(5日)平均成交量"),
            ("avg_volume_long", self.avg_volume_long, "中期(20日)平均成交量"),
            ("volume_ratio", self.volume_ratio, "短期与中期量能比值"),
            ("turnover_mean", self.turnover_mean, "平均换手率"),
            ("price_range", self.price_range, "价格振幅、波动性"),
            ("kline_shadow_ratio", self.kline_shadow_ratio, "上影线/下影线比例"),
        ];

        let mut map = serializer.serialize_map(Some(floats.len() + 2))?;
        for (key, value, description) in floats {
            map.serialize_entry(key, &Described { value, description })?;
        }
        map.serialize_entry(
            "consolidation_days",
            &Described {
                value: self.consolidation_days,
                description: "横盘整理天数",
            },
        )?;
        map.serialize_entry(
            "volatility_trend",
            &Described {
                value: self.volatility_trend,
                description: "波动趋势",
            },
        )?;
        map.end()
    }
}

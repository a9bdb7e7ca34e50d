//! Normalization of raw provider rows into canonical bars.

use chrono::{Datelike, Weekday};

use super::{Bar, RawRow};

/// Fill value for a missing price column.
pub const DEFAULT_PRICE: f64 = 100.0;

/// Fill value for a missing volume column.
pub const DEFAULT_VOLUME: f64 = 1_000_000.0;

/// Fill value for a missing turnover column.
pub const DEFAULT_TURNOVER: f64 = 1.0;

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

fn is_weekend(row: &RawRow) -> bool {
    matches!(row.date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Convert raw rows into a clean, ascending, weekday-only bar series.
///
/// Missing or non-finite values take the column default. `high`/`low` are
/// widened to enclose the body, and a repeated date keeps the last row seen.
pub fn normalize_rows(rows: Vec<RawRow>) -> Vec<Bar> {
    let mut bars: Vec<Bar> = rows
        .into_iter()
        .filter(|row| !is_weekend(row))
        .map(|row| {
            let open = finite_or(row.open, DEFAULT_PRICE);
            let close = finite_or(row.close, DEFAULT_PRICE);
            let high = finite_or(row.high, DEFAULT_PRICE).max(open.max(close));
            let low = finite_or(row.low, DEFAULT_PRICE).min(open.min(close));
            let volume = finite_or(row.volume, DEFAULT_VOLUME);
            let turnover = finite_or(row.turnover, DEFAULT_TURNOVER);

            Bar {
                date: row.date,
                open,
                close,
                high,
                low,
                volume,
                turnover,
                volume_turnover_product: volume * turnover,
            }
        })
        .collect();

    // Stable sort keeps upstream order among equal dates, so the last one wins below
    bars.sort_by_key(|b| b.date);

    let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
    for bar in bars {
        match deduped.last_mut() {
            Some(prev) if prev.date == bar.date => *prev = bar,
            _ => deduped.push(bar),
        }
    }
    deduped
}

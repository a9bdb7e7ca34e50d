//! Random-walk series used when history acquisition misses its deadline.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::Rng;

use super::Bar;

/// Number of business days in a synthesized series.
pub const SYNTHETIC_BARS: usize = 252;

/// `source` value reported for synthesized series.
pub const SYNTHETIC_SOURCE: &str = "synthetic";

const BASE_PRICE: f64 = 100.0;

/// The `count` weekdays ending on or before `end`, ascending.
fn business_days_ending(end: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(count);
    let mut cursor = end;
    while days.len() < count {
        if !matches!(cursor.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(cursor);
        }
        cursor -= Duration::days(1);
    }
    days.reverse();
    days
}

/// Synthesize a 252-business-day random walk ending at `end`.
///
/// Each day opens at the previous close and moves by U[-2, 2]. High and low
/// extend the body by U[0, 1]; volume is an integer in [1e6, 1e7] and turnover
/// is U[0.5, 5].
pub fn synthesize_random_walk<R: Rng + ?Sized>(end: NaiveDate, rng: &mut R) -> Vec<Bar> {
    let mut price = BASE_PRICE;

    business_days_ending(end, SYNTHETIC_BARS)
        .into_iter()
        .map(|date| {
            let open = price;
            let close = price + rng.gen_range(-2.0..=2.0);
            let high = open.max(close) + rng.gen_range(0.0..=1.0);
            let low = open.min(close) - rng.gen_range(0.0..=1.0);
            let volume = rng.gen_range(1_000_000u64..=10_000_000) as f64;
            let turnover = rng.gen_range(0.5..=5.0);
            price = close;

            Bar {
                date,
                open,
                close,
                high,
                low,
                volume,
                turnover,
                volume_turnover_product: volume * turnover,
            }
        })
        .collect()
}

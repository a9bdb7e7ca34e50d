//! Ticker classification and exchange prefix helpers.
//!
//! Symbols arrive in several shapes: bare A-share codes (`600000`), prefixed
//! codes (`sh600000`, `hk00700`), Hong Kong codes (`00700`) and US tickers (`AAPL`).

use serde::{Deserialize, Serialize};

/// Which provider family a raw symbol most likely belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHint {
    /// Domestic A-share provider
    Domestic,
    /// Overseas equity provider
    Overseas,
    /// Secondary provider (Hong Kong and everything unrecognized)
    Secondary,
}

/// Prefixes recognized as already naming a market.
const MARKET_PREFIXES: &[&str] = &["sh", "sz", "hk"];

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// True when the symbol starts with `sh`, `sz` or `hk`.
pub fn has_market_prefix(symbol: &str) -> bool {
    MARKET_PREFIXES.iter().any(|p| symbol.starts_with(p))
}

/// True when the symbol is a non-empty run of letters.
pub fn is_alphabetic_ticker(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphabetic())
}

/// Map a raw ticker to a provider hint. Never fails.
pub fn classify(symbol: &str) -> ProviderHint {
    if is_digits(symbol, 6) || symbol.starts_with("sh") || symbol.starts_with("sz") {
        ProviderHint::Domestic
    } else if is_alphabetic_ticker(symbol) {
        ProviderHint::Overseas
    } else {
        // 5-digit HK codes, hk-prefixed codes and anything unrecognized
        ProviderHint::Secondary
    }
}

/// Exchange prefix for a bare six-digit A-share code (`sh` for 6/9, else `sz`).
pub fn exchange_for_code(code: &str) -> &'static str {
    match code.as_bytes().first() {
        Some(b'6') | Some(b'9') => "sh",
        _ => "sz",
    }
}

/// Market label shown alongside basic stock info.
pub fn market_label(symbol: &str) -> &'static str {
    match classify(symbol) {
        ProviderHint::Domestic => "A股",
        _ => "其他",
    }
}

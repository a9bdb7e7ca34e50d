//! Deadline-bounded history acquisition with ordered provider failover.
//!
//! The attempt sequence runs on a spawned task. The caller waits at most the
//! configured deadline; past it, the task is left to finish on its own and a
//! synthesized random-walk series is returned instead.

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use screener_common::{Error, Result};

use crate::data::{
    normalize_rows, synthesize_random_walk, AdjustMode, Bar, HistoryProvider, HistoryQuery,
    HistorySeries, SYNTHETIC_SOURCE,
};
use crate::symbol::{has_market_prefix, is_alphabetic_ticker};

/// Default wall-clock bound for one fetch.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(15);

/// Start date used when the caller asks for the full history.
pub fn full_history_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Which configured provider an attempt goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    Primary,
    Secondary,
    Overseas,
}

/// Ordered `(provider, symbol form)` attempts for a raw symbol.
///
/// Prefixed symbols go to the primary and secondary providers as-is; bare
/// symbols are tried with a synthesized `sz` then `sh` prefix on each. An
/// alphabetic ticker then goes to the overseas provider, and the raw symbol
/// is finally offered to the secondary provider. Repeated pairs are dropped.
pub fn attempt_plan(symbol: &str) -> Vec<(ProviderRole, String)> {
    let mut plan: Vec<(ProviderRole, String)> = Vec::new();
    let mut push = |role: ProviderRole, sym: String| {
        if !plan.iter().any(|(r, s)| *r == role && *s == sym) {
            plan.push((role, sym));
        }
    };

    if has_market_prefix(symbol) {
        push(ProviderRole::Primary, symbol.to_string());
        push(ProviderRole::Secondary, symbol.to_string());
    } else {
        push(ProviderRole::Primary, format!("sz{}", symbol));
        push(ProviderRole::Primary, format!("sh{}", symbol));
        push(ProviderRole::Secondary, format!("sz{}", symbol));
        push(ProviderRole::Secondary, format!("sh{}", symbol));
    }
    if is_alphabetic_ticker(symbol) {
        push(ProviderRole::Overseas, symbol.to_string());
    }
    push(ProviderRole::Secondary, symbol.to_string());

    plan
}

/// Fetches a normalized daily series for one symbol within a fixed deadline.
#[derive(Clone)]
pub struct HistoryFetcher {
    primary: Arc<dyn HistoryProvider>,
    secondary: Arc<dyn HistoryProvider>,
    overseas: Arc<dyn HistoryProvider>,
    deadline: Duration,
}

impl HistoryFetcher {
    /// Create a fetcher with the default 15-second deadline.
    pub fn new(
        primary: Arc<dyn HistoryProvider>,
        secondary: Arc<dyn HistoryProvider>,
        overseas: Arc<dyn HistoryProvider>,
    ) -> Self {
        Self {
            primary,
            secondary,
            overseas,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Override the deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    fn provider(&self, role: ProviderRole) -> Arc<dyn HistoryProvider> {
        match role {
            ProviderRole::Primary => Arc::clone(&self.primary),
            ProviderRole::Secondary => Arc::clone(&self.secondary),
            ProviderRole::Overseas => Arc::clone(&self.overseas),
        }
    }

    /// Fetch the daily series for `symbol`.
    ///
    /// `end` defaults to today and `start` to the full history. Fails with
    /// `SymbolNotFound` only when every attempt errors or comes back empty;
    /// a deadline expiry yields a synthesized series instead of an error.
    pub async fn fetch(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        adjust: AdjustMode,
    ) -> Result<HistorySeries> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(Error::InvalidInput("symbol must not be empty".into()));
        }

        let end = end.unwrap_or_else(|| Local::now().date_naive());
        let start = start.unwrap_or_else(full_history_start);
        if start > end {
            return Err(Error::InvalidInput(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        let base = HistoryQuery {
            symbol: symbol.to_string(),
            start,
            end,
            adjust,
        };
        let attempts: Vec<_> = attempt_plan(symbol)
            .into_iter()
            .map(|(role, sym)| (self.provider(role), base.with_symbol(sym)))
            .collect();

        let worker = tokio::spawn(run_attempts(attempts));

        let series = |source: &str, bars: Vec<Bar>| HistorySeries {
            symbol: symbol.to_string(),
            start_date: start,
            end_date: end,
            adjust,
            source: source.to_string(),
            bars,
        };

        match tokio::time::timeout(self.deadline, worker).await {
            Ok(Ok(Some((source, bars)))) => {
                info!(symbol, source, bars = bars.len(), "History fetched");
                Ok(series(source, bars))
            }
            Ok(Ok(None)) => Err(Error::SymbolNotFound(format!(
                "无法获取股票 {} 的数据。请检查股票代码是否正确，或者尝试添加正确的市场前缀（如 sz000937 或 sh600000）。",
                symbol
            ))),
            Ok(Err(join_err)) => Err(Error::Internal(format!(
                "history worker failed: {}",
                join_err
            ))),
            Err(_) => {
                warn!(
                    symbol,
                    deadline_secs = self.deadline.as_secs_f64(),
                    "History fetch timed out, returning synthetic series"
                );
                let bars = {
                    let mut rng = rand::thread_rng();
                    synthesize_random_walk(end, &mut rng)
                };
                Ok(series(SYNTHETIC_SOURCE, bars))
            }
        }
    }
}

/// Walk the attempts in order; the first non-empty normalized result wins.
async fn run_attempts(
    attempts: Vec<(Arc<dyn HistoryProvider>, HistoryQuery)>,
) -> Option<(&'static str, Vec<Bar>)> {
    for (provider, query) in attempts {
        let name = provider.name();
        debug!(provider = name, symbol = %query.symbol, "Trying history provider");

        match provider.query(&query).await {
            Ok(rows) => {
                let bars = normalize_rows(rows);
                if bars.is_empty() {
                    debug!(provider = name, symbol = %query.symbol, "Provider returned no rows");
                    continue;
                }
                return Some((name, bars));
            }
            Err(e) => {
                warn!(provider = name, symbol = %query.symbol, error = %e, "History provider failed");
            }
        }
    }
    None
}

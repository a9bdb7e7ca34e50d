//! Stock Screener - history, features and rule/AI screening over HTTP.

use anyhow::Result;
use screener_common::config::Config;
use screener_common::logging::init_logging;
use screener_service::ScreenerService;

#[tokio::main]
async fn main() -> Result<()> {
    let startup_start = std::time::Instant::now();

    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Stock Screener v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!(ai = ?config.ai, "Loaded AI settings");

    let service = ScreenerService::new(config);

    let startup_duration = startup_start.elapsed();
    tracing::info!(
        duration_ms = startup_duration.as_millis() as u64,
        "Service initialized in {:?}",
        startup_duration
    );

    service.start().await
}

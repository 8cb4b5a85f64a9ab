use std::sync::Arc;

use macrocal::{
    init_logging, log_app_start, logging_config_from_env, run_refresh, FredClient, OriginFetcher,
    RestKvCache, RetryingFetcher,
};
use tracing::info;

/// One refresh cycle, meant to be invoked by an external scheduler on a
/// weekday cadence. Exits non-zero if the snapshot could not be written.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("calendar_refresh", &logging_cfg);

    let fred = FredClient::from_env()?;
    let (max_retries, retry_backoff_ms) =
        (fred.config().max_retries, fred.config().retry_backoff_ms);
    let fetcher: Arc<dyn OriginFetcher> =
        Arc::new(RetryingFetcher::new(fred, max_retries, retry_backoff_ms));
    let cache = RestKvCache::from_env()?;

    let snapshot = run_refresh(fetcher, &cache).await?;
    info!(
        component = "calendar_refresh",
        event = "refresh.done",
        series = snapshot.observations.len(),
        cached_at = %snapshot.cached_at
    );

    Ok(())
}

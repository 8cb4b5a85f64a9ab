use std::{net::SocketAddr, sync::Arc, time::Duration};

use macrocal::{
    calendar_router, init_logging, log_app_bind, log_app_start, logging_config_from_env,
    run_refresh, FredClient, InMemorySharedCache, OriginFetcher, RestKvCache, RetryingFetcher,
    SharedCache,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start("calendar_server", &logging_cfg);

    let addr: SocketAddr = std::env::var("MACROCAL_CALENDAR_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()?;

    let fred = FredClient::from_env()?;
    let (max_retries, retry_backoff_ms) =
        (fred.config().max_retries, fred.config().retry_backoff_ms);
    let fetcher: Arc<dyn OriginFetcher> =
        Arc::new(RetryingFetcher::new(fred, max_retries, retry_backoff_ms));
    let cache = shared_cache_from_env();

    spawn_refresh_loop(Arc::clone(&fetcher), Arc::clone(&cache));

    let app = calendar_router(cache, fetcher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn shared_cache_from_env() -> Arc<dyn SharedCache> {
    match RestKvCache::from_env() {
        Ok(cache) => {
            info!(
                component = "calendar_server",
                event = "cache.selected",
                cache = "rest_kv"
            );
            Arc::new(cache)
        }
        Err(err) => {
            info!(
                component = "calendar_server",
                event = "cache.selected",
                cache = "in_memory",
                reason = %err
            );
            Arc::new(InMemorySharedCache::new())
        }
    }
}

/// In-process stand-in for the external scheduler. Disabled when
/// MACROCAL_REFRESH_INTERVAL_SECS is 0 or unset; deployments with a real
/// cron run the calendar_refresh binary instead.
fn spawn_refresh_loop(fetcher: Arc<dyn OriginFetcher>, cache: Arc<dyn SharedCache>) {
    let interval_secs = std::env::var("MACROCAL_REFRESH_INTERVAL_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0);
    if interval_secs == 0 {
        return;
    }

    info!(
        component = "calendar_server",
        event = "refresh_loop.start",
        interval_secs
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            if let Err(err) = run_refresh(Arc::clone(&fetcher), cache.as_ref()).await {
                error!(
                    component = "calendar_server",
                    event = "refresh_loop.failed",
                    error = %err
                );
            }
        }
    });
}

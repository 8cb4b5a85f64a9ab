//! Scheduled background refresh: fetch every indicator, write one snapshot.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::cache::{write_snapshot, CacheError, SharedCache};
use crate::observations::{fetch_observation_map, ObservationSnapshot, OriginFetcher};

/// One refresh cycle. Fetches all indicators concurrently (each failure
/// degrades to a null pair) and overwrites the shared snapshot, last writer
/// wins. This is the only scheduled writer; cold starts reuse the same path
/// from the read endpoint.
pub async fn run_refresh(
    fetcher: Arc<dyn OriginFetcher>,
    cache: &dyn SharedCache,
) -> Result<ObservationSnapshot, CacheError> {
    let observations = fetch_observation_map(fetcher).await;
    let populated = observations
        .values()
        .filter(|pair| pair.actual.is_some() || pair.prior.is_some())
        .count();
    let snapshot = ObservationSnapshot {
        observations,
        cached_at: Utc::now(),
    };

    write_snapshot(cache, &snapshot).await?;
    info!(
        component = "background_refresher",
        event = "snapshot.written",
        series_total = snapshot.observations.len(),
        series_populated = populated,
        cached_at = %snapshot.cached_at
    );

    Ok(snapshot)
}

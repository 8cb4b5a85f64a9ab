//! Cache-read HTTP endpoint.
//!
//! `GET /calendar/observations` returns the shared snapshot. An empty cache
//! triggers a synchronous cold-start fetch through the same per-indicator
//! fan-out the background refresher uses, writing the result back before
//! responding, so repeated concurrent cold starts converge on the same
//! payload.
//!
//! `?series_id=X` keeps the legacy single-series envelope alive for the
//! per-indicator fallback path: `{observations: [{value}], cachedAt}` with
//! entries newest first. An unknown series id falls through to the full
//! payload.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::cache::{read_snapshot, CacheError, SharedCache};
use crate::observations::{ObservationPair, ObservationSnapshot, OriginFetcher};
use crate::refresher::run_refresh;

#[derive(Clone)]
struct CalendarAppState {
    cache: Arc<dyn SharedCache>,
    fetcher: Arc<dyn OriginFetcher>,
}

pub fn calendar_router(cache: Arc<dyn SharedCache>, fetcher: Arc<dyn OriginFetcher>) -> Router {
    Router::new()
        .route("/calendar/observations", get(get_observations))
        .with_state(CalendarAppState { cache, fetcher })
}

#[derive(Debug, Deserialize)]
struct ObservationsQuery {
    series_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompatObservation {
    value: String,
}

#[derive(Debug, Serialize)]
struct CompatEnvelope {
    observations: Vec<CompatObservation>,
    #[serde(rename = "cachedAt")]
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct EndpointErrorBody {
    error: &'static str,
    detail: String,
}

async fn get_observations(
    State(state): State<CalendarAppState>,
    Query(query): Query<ObservationsQuery>,
) -> Response {
    let snapshot = match load_or_populate(&state).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(
                component = "cache_read_endpoint",
                event = "snapshot.read_failed",
                error = %err
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(EndpointErrorBody {
                    error: "failed to read calendar cache",
                    detail: err.to_string(),
                }),
            )
                .into_response();
        }
    };

    if let Some(series_id) = query.series_id.as_deref() {
        if let Some(pair) = snapshot.observations.get(series_id) {
            let envelope = compat_envelope(pair, snapshot.cached_at);
            return ([(header::CACHE_CONTROL, "no-store")], Json(envelope)).into_response();
        }
    }

    ([(header::CACHE_CONTROL, "no-store")], Json(snapshot)).into_response()
}

async fn load_or_populate(state: &CalendarAppState) -> Result<ObservationSnapshot, CacheError> {
    if let Some(snapshot) = read_snapshot(state.cache.as_ref()).await? {
        return Ok(snapshot);
    }

    info!(
        component = "cache_read_endpoint",
        event = "snapshot.cold_start"
    );
    run_refresh(Arc::clone(&state.fetcher), state.cache.as_ref()).await
}

fn compat_envelope(pair: &ObservationPair, cached_at: DateTime<Utc>) -> CompatEnvelope {
    let observations = [pair.actual, pair.prior]
        .into_iter()
        .flatten()
        .map(|value| CompatObservation {
            value: value.to_string(),
        })
        .collect();

    CompatEnvelope {
        observations,
        cached_at,
    }
}

//! Latest-observation fetching from the FRED origin.
//!
//! One fetch per indicator returns the two most recent released values
//! (newest first) as an [`ObservationPair`]. Batch callers fan out one task
//! per indicator; a failed indicator degrades to a null pair and never fails
//! the batch.

use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::indicators::INDICATORS;

const DEFAULT_FRED_BASE_URL: &str = "https://api.stlouisfed.org/fred/series/observations";
const OBSERVATION_FETCH_LIMIT: u32 = 3;

/// Raw values FRED uses for a period with no released figure.
const MISSING_VALUE_MARKERS: [&str; 2] = [".", ""];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationPair {
    pub actual: Option<f64>,
    pub prior: Option<f64>,
}

pub type ObservationMap = BTreeMap<String, ObservationPair>;

/// The full-batch snapshot held by the shared cache. Field names match the
/// deployed wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSnapshot {
    #[serde(rename = "obsMap")]
    pub observations: ObservationMap,
    #[serde(rename = "cachedAt")]
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum OriginError {
    #[error("MACROCAL_FRED_API_KEY is not set")]
    MissingApiKey,
    #[error("HTTP client build error: {0}")]
    HttpClientBuild(String),
    #[error("origin request failed for {series_id}: {message}")]
    Http { series_id: String, message: String },
    #[error("origin returned HTTP {status} for {series_id}")]
    UnexpectedStatus { series_id: String, status: u16 },
    #[error("origin response for {series_id} is not valid JSON: {message}")]
    Body { series_id: String, message: String },
}

#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Fetches the two most recent non-missing observations for one series.
    async fn fetch_pair(&self, series_id: &str) -> Result<ObservationPair, OriginError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FredConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl FredConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_FRED_BASE_URL.to_string(),
            timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }

    /// Reads the origin configuration from the environment. A missing API
    /// key is a fatal configuration error, not a retryable condition.
    pub fn from_env() -> Result<Self, OriginError> {
        let api_key = env::var("MACROCAL_FRED_API_KEY")
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(OriginError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Ok(base_url) = env::var("MACROCAL_FRED_BASE_URL") {
            let trimmed = base_url.trim();
            if !trimmed.is_empty() {
                config.base_url = trimmed.to_string();
            }
        }

        Ok(config)
    }
}

pub struct FredClient {
    config: FredConfig,
    client: reqwest::Client,
}

impl FredClient {
    pub fn new(config: FredConfig) -> Result<Self, OriginError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| OriginError::HttpClientBuild(err.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self, OriginError> {
        Self::new(FredConfig::from_env()?)
    }

    pub fn config(&self) -> &FredConfig {
        &self.config
    }

    fn observations_url(&self, series_id: &str) -> String {
        format!(
            "{}?series_id={}&api_key={}&file_type=json&sort_order=desc&limit={}",
            self.config.base_url, series_id, self.config.api_key, OBSERVATION_FETCH_LIMIT
        )
    }
}

#[async_trait]
impl OriginFetcher for FredClient {
    async fn fetch_pair(&self, series_id: &str) -> Result<ObservationPair, OriginError> {
        let url = self.observations_url(series_id);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|err| OriginError::Http {
                series_id: series_id.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::UnexpectedStatus {
                series_id: series_id.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|err| OriginError::Http {
            series_id: series_id.to_string(),
            message: err.to_string(),
        })?;
        let parsed: FredObservationsResponse =
            serde_json::from_str(&body).map_err(|err| OriginError::Body {
                series_id: series_id.to_string(),
                message: err.to_string(),
            })?;

        let pair = pair_from_raw_values(parsed.observations.iter().map(|obs| obs.value.as_str()));
        debug!(
            component = "origin_fetcher",
            event = "series.fetched",
            series_id,
            has_actual = pair.actual.is_some(),
            has_prior = pair.prior.is_some()
        );
        Ok(pair)
    }
}

#[derive(Debug, Deserialize)]
struct FredObservationsResponse {
    #[serde(default)]
    observations: Vec<FredObservation>,
}

#[derive(Debug, Deserialize)]
struct FredObservation {
    value: String,
}

/// Builds a pair from raw observation values ordered newest first, dropping
/// the provider's missing-value markers before parsing.
pub fn pair_from_raw_values<'a>(values: impl Iterator<Item = &'a str>) -> ObservationPair {
    let mut released = values.filter(|value| !MISSING_VALUE_MARKERS.contains(value));
    let actual = released.next().and_then(|value| value.parse::<f64>().ok());
    let prior = released.next().and_then(|value| value.parse::<f64>().ok());
    ObservationPair { actual, prior }
}

/// Retry decorator for origin fetches: capped exponential backoff around any
/// [`OriginFetcher`]. Configuration errors are returned immediately.
pub struct RetryingFetcher<F> {
    inner: F,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl<F: OriginFetcher> RetryingFetcher<F> {
    pub fn new(inner: F, max_retries: u32, retry_backoff_ms: u64) -> Self {
        Self {
            inner,
            max_retries,
            retry_backoff_ms,
        }
    }
}

#[async_trait]
impl<F: OriginFetcher> OriginFetcher for RetryingFetcher<F> {
    async fn fetch_pair(&self, series_id: &str) -> Result<ObservationPair, OriginError> {
        let mut attempt: u32 = 0;

        loop {
            match self.inner.fetch_pair(series_id).await {
                Ok(pair) => return Ok(pair),
                Err(err @ OriginError::MissingApiKey) => return Err(err),
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        component = "origin_fetcher",
                        event = "series.retry",
                        series_id,
                        attempt,
                        error = %err
                    );
                    tokio::time::sleep(backoff_duration(self.retry_backoff_ms, attempt)).await;
                }
            }
        }
    }
}

fn backoff_duration(base_ms: u64, attempt: u32) -> std::time::Duration {
    let shift = attempt.saturating_sub(1).min(10);
    let factor = 1u64 << shift;
    std::time::Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Fan-out/fan-in over the full indicator set: one task per series, each
/// failure isolated to a null pair so a bad series never sinks the batch.
pub async fn fetch_observation_map(fetcher: Arc<dyn OriginFetcher>) -> ObservationMap {
    let mut tasks = JoinSet::new();

    for def in &INDICATORS {
        let fetcher = Arc::clone(&fetcher);
        let series_id = def.id;
        tasks.spawn(async move {
            let pair = match fetcher.fetch_pair(series_id).await {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(
                        component = "origin_fetcher",
                        event = "series.failed",
                        series_id,
                        error = %err
                    );
                    ObservationPair::default()
                }
            };
            (series_id, pair)
        });
    }

    let mut map = ObservationMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((series_id, pair)) => {
                map.insert(series_id.to_string(), pair);
            }
            Err(err) => {
                warn!(
                    component = "origin_fetcher",
                    event = "series.join_failed",
                    error = %err
                );
            }
        }
    }

    // A panicked task leaves its slot empty; fill it so every indicator is
    // always present in the snapshot.
    for def in &INDICATORS {
        map.entry(def.id.to_string()).or_default();
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyFetcher {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl OriginFetcher for FlakyFetcher {
        async fn fetch_pair(&self, _series_id: &str) -> Result<ObservationPair, OriginError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok(ObservationPair {
                    actual: Some(1.0),
                    prior: Some(2.0),
                })
            } else {
                Err(OriginError::Http {
                    series_id: "X".to_string(),
                    message: "boom".to_string(),
                })
            }
        }
    }

    struct KeylessFetcher;

    #[async_trait]
    impl OriginFetcher for KeylessFetcher {
        async fn fetch_pair(&self, _series_id: &str) -> Result<ObservationPair, OriginError> {
            Err(OriginError::MissingApiKey)
        }
    }

    struct FailOneFetcher {
        failing_series: &'static str,
    }

    #[async_trait]
    impl OriginFetcher for FailOneFetcher {
        async fn fetch_pair(&self, series_id: &str) -> Result<ObservationPair, OriginError> {
            if series_id == self.failing_series {
                Err(OriginError::UnexpectedStatus {
                    series_id: series_id.to_string(),
                    status: 429,
                })
            } else {
                Ok(ObservationPair {
                    actual: Some(10.0),
                    prior: Some(9.0),
                })
            }
        }
    }

    #[test]
    fn missing_markers_are_filtered_before_parsing() {
        let pair = pair_from_raw_values(["3.2", ".", "3.4"].into_iter());
        assert_eq!(pair.actual, Some(3.2));
        assert_eq!(pair.prior, Some(3.4));

        let pair = pair_from_raw_values([".", "", "2.5"].into_iter());
        assert_eq!(pair.actual, Some(2.5));
        assert_eq!(pair.prior, None);

        let pair = pair_from_raw_values(std::iter::empty());
        assert_eq!(pair, ObservationPair::default());
    }

    #[test]
    fn snapshot_serializes_with_deployed_field_names() {
        let mut observations = ObservationMap::new();
        observations.insert(
            "CPIAUCSL".to_string(),
            ObservationPair {
                actual: Some(3.2),
                prior: Some(3.4),
            },
        );
        let snapshot = ObservationSnapshot {
            observations,
            cached_at: DateTime::parse_from_rfc3339("2025-06-10T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert!(json.get("obsMap").is_some());
        assert!(json.get("cachedAt").is_some());
        assert_eq!(json["obsMap"]["CPIAUCSL"]["actual"], 3.2);

        let back: ObservationSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[tokio::test]
    async fn retrying_fetcher_recovers_within_the_retry_budget() {
        let fetcher = RetryingFetcher::new(
            FlakyFetcher {
                calls: AtomicU32::new(0),
                succeed_on: 3,
            },
            2,
            1,
        );

        let pair = fetcher.fetch_pair("CPIAUCSL").await.unwrap();
        assert_eq!(pair.actual, Some(1.0));
    }

    #[tokio::test]
    async fn retrying_fetcher_gives_up_after_max_retries() {
        let inner = FlakyFetcher {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        };
        let fetcher = RetryingFetcher::new(inner, 2, 1);

        let err = fetcher.fetch_pair("CPIAUCSL").await.unwrap_err();
        assert!(matches!(err, OriginError::Http { .. }));
        assert_eq!(fetcher.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_api_key_is_never_retried() {
        let fetcher = RetryingFetcher::new(KeylessFetcher, 5, 1);
        let err = fetcher.fetch_pair("CPIAUCSL").await.unwrap_err();
        assert!(matches!(err, OriginError::MissingApiKey));
    }

    #[tokio::test]
    async fn batch_fetch_isolates_a_failing_series() {
        let map = fetch_observation_map(Arc::new(FailOneFetcher {
            failing_series: "GDP",
        }))
        .await;

        assert_eq!(map.len(), INDICATORS.len());
        assert_eq!(map["GDP"], ObservationPair::default());
        assert_eq!(map["CPIAUCSL"].actual, Some(10.0));
        assert_eq!(map["FEDFUNDS"].prior, Some(9.0));
    }
}

//! Client-side freshness control for the calendar panel.
//!
//! Per refresh cycle the controller moves `Idle -> Checking ->
//! (WeekendHold | Fetching) -> Settled`. It seeds its visible state from the
//! persisted client cache so the panel is never blank on first paint, skips
//! the network entirely on weekends, and merges fetch results through
//! [`merge_if_better`] so a failed or empty refresh can never replace a
//! populated view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client_store::{ClientCacheEntry, ClientCacheStore, StoreError};
use crate::freshness::{merge_if_better, staleness_label, MergeOutcome, RefreshOutcome, StalenessLabel};
use crate::observations::ObservationSnapshot;
use crate::schedule::{enrich_events, is_weekend, project_release_events, EnrichedEvent};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("calendar endpoint unreachable: {0}")]
    Transport(String),
    #[error("calendar endpoint payload error: {0}")]
    Payload(String),
}

/// Client-side view of the cache-read endpoint.
#[async_trait]
pub trait CalendarFetch: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<ObservationSnapshot, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEndpointConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for CalendarEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl CalendarEndpointConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("MACROCAL_CALENDAR_URL") {
            let trimmed = raw.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.base_url = trimmed.to_string();
            }
        }
        config
    }
}

pub struct HttpCalendarClient {
    config: CalendarEndpointConfig,
    client: reqwest::Client,
}

impl HttpCalendarClient {
    pub fn new(config: CalendarEndpointConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl CalendarFetch for HttpCalendarClient {
    async fn fetch_snapshot(&self) -> Result<ObservationSnapshot, FetchError> {
        let url = format!("{}/calendar/observations", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport(format!(
                "calendar endpoint returned HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| FetchError::Payload(err.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Checking,
    WeekendHold,
    Fetching,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A fetch is already outstanding; this tick is a no-op.
    SkippedInFlight,
    /// The controller was deactivated; nothing was fetched or applied.
    SkippedInactive,
    /// Weekend: no network call, persisted cache re-surfaced.
    WeekendHold,
    /// A strictly non-empty refresh replaced memory and the persisted cache.
    Refreshed,
    /// The refresh failed or was empty; the previous view was kept.
    HeldStale,
    /// No cache and no live data; the view carries a hard error.
    HardError,
}

/// What presentation consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarView {
    pub events: Vec<EnrichedEvent>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub staleness: StalenessLabel,
    pub fomc_window_uncovered: bool,
    pub error: Option<String>,
}

pub struct ClientFreshnessController<S: ClientCacheStore> {
    store: S,
    current: Option<ClientCacheEntry>,
    phase: RefreshPhase,
    in_flight: bool,
    active: bool,
    weekend_hold: bool,
    fomc_window_uncovered: bool,
    last_error: Option<String>,
}

impl<S: ClientCacheStore> ClientFreshnessController<S> {
    /// Seeds visible state from the persisted cache so the first paint is
    /// never blank when a prior session left data behind.
    pub fn new(store: S) -> Result<Self, StoreError> {
        let current = store.load()?;
        if let Some(entry) = &current {
            debug!(
                component = "freshness_controller",
                event = "cache.seeded",
                events = entry.events.len(),
                fetched_at = %entry.fetched_at
            );
        }

        Ok(Self {
            store,
            current,
            phase: RefreshPhase::Idle,
            in_flight: false,
            active: true,
            weekend_hold: false,
            fomc_window_uncovered: false,
            last_error: None,
        })
    }

    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    /// Marks the controller inactive: subsequent ticks are no-ops and any
    /// in-flight result is discarded on arrival.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn view(&self, now: DateTime<Utc>) -> CalendarView {
        let (events, fetched_at) = match &self.current {
            Some(entry) => (entry.events.clone(), Some(entry.fetched_at)),
            None => (Vec::new(), None),
        };

        CalendarView {
            staleness: staleness_label(fetched_at, now, self.weekend_hold),
            error: if self.current.is_none() {
                self.last_error.clone()
            } else {
                None
            },
            events,
            fetched_at,
            fomc_window_uncovered: self.fomc_window_uncovered,
        }
    }

    pub async fn tick(&mut self, now: DateTime<Utc>, fetch: &dyn CalendarFetch) -> TickOutcome {
        if !self.active {
            return TickOutcome::SkippedInactive;
        }
        if self.in_flight {
            return TickOutcome::SkippedInFlight;
        }

        self.phase = RefreshPhase::Checking;
        let today = now.date_naive();

        // Macro data does not move on non-business days and the shared cache
        // is not refreshed either, so weekends re-surface the persisted entry
        // without touching the network.
        if is_weekend(today) {
            self.phase = RefreshPhase::WeekendHold;
            self.weekend_hold = true;
            info!(
                component = "freshness_controller",
                event = "tick.weekend_hold",
                date = %today
            );
            self.phase = RefreshPhase::Settled;
            return TickOutcome::WeekendHold;
        }

        self.weekend_hold = false;
        self.phase = RefreshPhase::Fetching;
        self.in_flight = true;
        let fetched = fetch.fetch_snapshot().await;
        self.in_flight = false;

        if !self.active {
            debug!(
                component = "freshness_controller",
                event = "tick.discarded_inactive"
            );
            return TickOutcome::SkippedInactive;
        }

        let schedule = project_release_events(today);
        self.fomc_window_uncovered = schedule.fomc_window_uncovered;

        let mut failure: Option<String> = None;
        let candidate = match fetched {
            Ok(snapshot) => {
                let events = enrich_events(&schedule.events, &snapshot.observations, today);
                if events.is_empty() {
                    RefreshOutcome::Empty
                } else {
                    RefreshOutcome::Fresh(ClientCacheEntry {
                        events,
                        fetched_at: now,
                    })
                }
            }
            Err(err) => {
                failure = Some(err.to_string());
                RefreshOutcome::Failed(err.to_string())
            }
        };

        let (merged, outcome) = merge_if_better(self.current.take(), candidate);
        self.current = merged;
        self.phase = RefreshPhase::Settled;

        match outcome {
            MergeOutcome::Replaced => {
                self.last_error = None;
                if let Some(entry) = &self.current {
                    if let Err(err) = self.store.save(entry) {
                        warn!(
                            component = "freshness_controller",
                            event = "cache.save_failed",
                            error = %err
                        );
                    }
                }
                info!(
                    component = "freshness_controller",
                    event = "tick.refreshed",
                    events = self.current.as_ref().map_or(0, |entry| entry.events.len())
                );
                TickOutcome::Refreshed
            }
            MergeOutcome::HeldExisting => {
                // Silent degrade: the only user-visible trace is the
                // staleness label.
                self.last_error = None;
                info!(
                    component = "freshness_controller",
                    event = "tick.held_stale",
                    reason = failure.as_deref().unwrap_or("empty refresh")
                );
                TickOutcome::HeldStale
            }
            MergeOutcome::NoData => {
                let reason = failure.unwrap_or_else(|| "empty refresh".to_string());
                warn!(
                    component = "freshness_controller",
                    event = "tick.no_data",
                    reason = %reason
                );
                self.last_error = Some(reason);
                TickOutcome::HardError
            }
        }
    }

    #[cfg(test)]
    fn force_in_flight(&mut self) {
        self.in_flight = true;
    }
}

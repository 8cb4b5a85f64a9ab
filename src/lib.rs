//! Macrocal core crate.
//!
//! Economic-event freshness and fallback subsystem for the market dashboard:
//! - release-date projection for the fixed macro indicator set
//! - point-in-time disclosure of released figures
//! - background refresh into the shared snapshot cache
//! - cache-read endpoint with cold-start populate
//! - client freshness controller over a persisted cache tier

mod cache;
mod client_store;
mod controller;
mod endpoint;
mod freshness;
mod indicators;
mod observability;
mod observations;
mod refresher;
mod schedule;

pub use cache::{
    decode_snapshot, encode_snapshot, read_snapshot, write_snapshot, CacheError,
    InMemorySharedCache, RestKvCache, RestKvConfig, SharedCache, SNAPSHOT_KEY,
};
pub use client_store::{
    ClientCacheEntry, ClientCacheStore, InMemoryClientStore, SqliteClientStore, StoreError,
};
pub use controller::{
    CalendarEndpointConfig, CalendarFetch, CalendarView, ClientFreshnessController, FetchError,
    HttpCalendarClient, RefreshPhase, TickOutcome,
};
pub use endpoint::calendar_router;
pub use freshness::{
    merge_if_better, staleness_label, MergeOutcome, RefreshOutcome, StalenessLabel,
};
pub use indicators::{
    compare_to_prior, format_value, indicator_by_id, indicator_order, Comparison, DisplayUnit,
    IndicatorDefinition, ReleaseRule, INDICATORS,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use observations::{
    fetch_observation_map, pair_from_raw_values, FredClient, FredConfig, ObservationMap,
    ObservationPair, ObservationSnapshot, OriginError, OriginFetcher, RetryingFetcher,
};
pub use refresher::run_refresh;
pub use schedule::{
    actual_is_disclosable, enrich_events, fomc_meeting_for_month, is_weekend,
    project_release_events, EnrichedEvent, EventInstance, FomcLookup, ReleaseSchedule,
};

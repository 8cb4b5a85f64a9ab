//! Full-chain coverage: shared cache -> read endpoint -> HTTP client ->
//! freshness controller -> persisted client cache.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use macrocal::{
    calendar_router, write_snapshot, CalendarEndpointConfig, ClientCacheEntry,
    ClientFreshnessController, EnrichedEvent, HttpCalendarClient, InMemoryClientStore,
    InMemorySharedCache, ObservationMap, ObservationPair, ObservationSnapshot, OriginError,
    OriginFetcher, SharedCache, StalenessLabel, TickOutcome,
};
use tokio::task::JoinHandle;

struct UnusedFetcher;

#[async_trait]
impl OriginFetcher for UnusedFetcher {
    async fn fetch_pair(&self, series_id: &str) -> Result<ObservationPair, OriginError> {
        Err(OriginError::Http {
            series_id: series_id.to_string(),
            message: "origin should not be reached in this test".to_string(),
        })
    }
}

fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

fn seeded_snapshot() -> ObservationSnapshot {
    let mut observations = ObservationMap::new();
    observations.insert(
        "CPIAUCSL".to_string(),
        ObservationPair {
            actual: Some(3.2),
            prior: Some(3.4),
        },
    );
    observations.insert(
        "PAYEMS".to_string(),
        ObservationPair {
            actual: Some(155_000.0),
            prior: Some(148_000.0),
        },
    );
    ObservationSnapshot {
        observations,
        cached_at: ts("2025-06-10T08:00:00Z"),
    }
}

async fn spawn_calendar_server(snapshot: ObservationSnapshot) -> (SocketAddr, JoinHandle<()>) {
    let cache: Arc<InMemorySharedCache> = Arc::new(InMemorySharedCache::new());
    write_snapshot(cache.as_ref(), &snapshot).await.unwrap();

    let app = calendar_router(
        cache as Arc<dyn SharedCache>,
        Arc::new(UnusedFetcher) as Arc<dyn OriginFetcher>,
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, handle)
}

#[tokio::test]
async fn weekday_tick_refreshes_from_the_live_endpoint() {
    let (addr, server) = spawn_calendar_server(seeded_snapshot()).await;
    let client = HttpCalendarClient::new(CalendarEndpointConfig {
        base_url: format!("http://{addr}"),
        timeout_ms: 2_000,
    })
    .unwrap();

    let mut controller = ClientFreshnessController::new(InMemoryClientStore::new()).unwrap();

    // 2025-06-10 is a Tuesday.
    let now = ts("2025-06-10T14:00:00Z");
    let outcome = controller.tick(now, &client).await;
    assert_eq!(outcome, TickOutcome::Refreshed);

    let view = controller.view(now);
    assert!(!view.events.is_empty());
    assert_eq!(
        view.staleness,
        StalenessLabel::UpdatedToday("14:00".to_string())
    );

    // CPI releases 2025-06-16: actual still embargoed, prior visible,
    // payrolls (released 2025-06-06) fully visible.
    let cpi = view
        .events
        .iter()
        .find(|event| event.indicator_id == "CPIAUCSL")
        .unwrap();
    assert_eq!(cpi.date, NaiveDate::from_ymd_opt(2025, 6, 16).unwrap());
    assert_eq!(cpi.actual, None);
    assert_eq!(cpi.prior, Some(3.4));

    let payrolls = view
        .events
        .iter()
        .find(|event| event.indicator_id == "PAYEMS")
        .unwrap();
    assert_eq!(payrolls.actual, Some(155_000.0));

    server.abort();
}

#[tokio::test]
async fn unreachable_endpoint_holds_the_persisted_cache() {
    let cached = ClientCacheEntry {
        events: vec![EnrichedEvent {
            indicator_id: "UNRATE".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 6).unwrap(),
            actual: Some(4.1),
            prior: Some(4.2),
        }],
        fetched_at: ts("2025-06-09T13:00:00Z"),
    };

    // Nothing listens on port 9.
    let client = HttpCalendarClient::new(CalendarEndpointConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_ms: 500,
    })
    .unwrap();

    let mut controller =
        ClientFreshnessController::new(InMemoryClientStore::seeded(cached.clone())).unwrap();

    let now = ts("2025-06-10T14:00:00Z");
    let outcome = controller.tick(now, &client).await;

    assert_eq!(outcome, TickOutcome::HeldStale);
    let view = controller.view(now);
    assert_eq!(view.events, cached.events);
    assert!(view.error.is_none());
    assert_eq!(
        view.staleness,
        StalenessLabel::UpdatedEarlier("2025-06-09 13:00".to_string())
    );
}

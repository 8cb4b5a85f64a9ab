use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use macrocal::{
    log_app_bind, log_app_start, run_refresh, ClientFreshnessController, InMemoryClientStore,
    InMemorySharedCache, LoggingConfig, ObservationPair, OriginError, OriginFetcher, TickOutcome,
};
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn block_on(f: impl std::future::Future<Output = ()>) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("single-thread runtime should build");
    rt.block_on(f);
}

struct PartiallyFailingFetcher;

#[async_trait]
impl OriginFetcher for PartiallyFailingFetcher {
    async fn fetch_pair(&self, series_id: &str) -> Result<ObservationPair, OriginError> {
        if series_id == "GDP" {
            Err(OriginError::UnexpectedStatus {
                series_id: series_id.to_string(),
                status: 429,
            })
        } else {
            Ok(ObservationPair {
                actual: Some(1.0),
                prior: Some(2.0),
            })
        }
    }
}

fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start("calendar_server", &cfg);
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
}

#[test]
fn refresh_logs_snapshot_write_and_per_series_degrades() {
    let logs = capture_logs(Level::INFO, || {
        block_on(async {
            let cache = InMemorySharedCache::new();
            let snapshot = run_refresh(Arc::new(PartiallyFailingFetcher), &cache)
                .await
                .expect("refresh should succeed despite one failing series");
            assert_eq!(
                snapshot.observations["GDP"],
                ObservationPair::default()
            );
        });
    });

    assert!(logs.contains("\"event\":\"series.failed\""));
    assert!(logs.contains("\"event\":\"snapshot.written\""));
}

#[test]
fn weekend_tick_logs_the_hold() {
    struct NeverFetch;

    #[async_trait]
    impl macrocal::CalendarFetch for NeverFetch {
        async fn fetch_snapshot(
            &self,
        ) -> Result<macrocal::ObservationSnapshot, macrocal::FetchError> {
            panic!("weekend tick must not fetch");
        }
    }

    let logs = capture_logs(Level::INFO, || {
        block_on(async {
            let mut controller =
                ClientFreshnessController::new(InMemoryClientStore::new()).unwrap();
            // 2025-06-07 is a Saturday.
            let outcome = controller
                .tick(ts("2025-06-07T10:00:00Z"), &NeverFetch)
                .await;
            assert_eq!(outcome, TickOutcome::WeekendHold);
        });
    });

    assert!(logs.contains("\"event\":\"tick.weekend_hold\""));
}

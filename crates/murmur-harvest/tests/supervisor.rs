//! Harvest run lifecycle tests with scripted in-process adapters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use murmur_core::Source;
use murmur_harvest::{
    HarvestError, HarvestRequest, HarvestSettings, HarvestState, HarvestSupervisor,
    HarvestedItem, SourceAdapter, SourceError, SourceRegistry, WorkerSink,
};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Fake adapters
// ---------------------------------------------------------------------------

/// Emits a fixed list of items, then returns.
struct Scripted {
    source: Source,
    items: Vec<HarvestedItem>,
}

#[async_trait]
impl SourceAdapter for Scripted {
    fn source(&self) -> Source {
        self.source
    }

    async fn run(
        &self,
        _topic: &str,
        _max_items: usize,
        sink: &mut WorkerSink,
        _stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        for item in &self.items {
            if !sink.emit(item.clone()).await.should_continue() {
                break;
            }
        }
        Ok(())
    }
}

/// Produces nothing and returns as soon as stop is requested.
struct Idle(Source);

#[async_trait]
impl SourceAdapter for Idle {
    fn source(&self) -> Source {
        self.0
    }

    async fn run(
        &self,
        _topic: &str,
        _max_items: usize,
        _sink: &mut WorkerSink,
        stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        stop.cancelled().await;
        Ok(())
    }
}

/// Ignores the stop signal entirely.
struct Stubborn(Source);

#[async_trait]
impl SourceAdapter for Stubborn {
    fn source(&self) -> Source {
        self.0
    }

    async fn run(
        &self,
        _topic: &str,
        _max_items: usize,
        _sink: &mut WorkerSink,
        _stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        tokio::time::sleep(Duration::from_secs(300)).await;
        Ok(())
    }
}

struct Panicking(Source);

#[async_trait]
impl SourceAdapter for Panicking {
    fn source(&self) -> Source {
        self.0
    }

    async fn run(
        &self,
        _topic: &str,
        _max_items: usize,
        _sink: &mut WorkerSink,
        _stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        panic!("page layout changed under the scraper");
    }
}

struct LoginFails(Source);

#[async_trait]
impl SourceAdapter for LoginFails {
    fn source(&self) -> Source {
        self.0
    }

    async fn run(
        &self,
        _topic: &str,
        _max_items: usize,
        _sink: &mut WorkerSink,
        _stop: &CancellationToken,
    ) -> Result<(), SourceError> {
        Err(SourceError::Status {
            platform: self.0,
            status: 403,
            url: "https://example.test/login".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn item(id: &str, raw_text: &str) -> HarvestedItem {
    HarvestedItem {
        id: id.to_string(),
        published_at: "2024-05-01T10:00:00Z".to_string(),
        raw_text: raw_text.to_string(),
    }
}

fn three_publications(prefix: &str) -> Vec<HarvestedItem> {
    vec![
        item(&format!("{prefix}_1"), "carbon tax now | agreed | too expensive"),
        item(&format!("{prefix}_2"), "new emissions targets announced"),
        item(&format!("{prefix}_3"), "policy debate continues"),
    ]
}

fn numbered(prefix: &str, n: usize) -> Vec<HarvestedItem> {
    (0..n)
        .map(|i| item(&format!("{prefix}_{i}"), &format!("post number {i}")))
        .collect()
}

fn settings() -> HarvestSettings {
    HarvestSettings {
        channel_capacity: 4,
        stop_timeout: Duration::from_millis(300),
        trigger_source: "test".to_string(),
    }
}

fn supervisor(pool: &SqlitePool, adapters: Vec<Arc<dyn SourceAdapter>>) -> HarvestSupervisor {
    let mut registry = SourceRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    HarvestSupervisor::new(pool.clone(), registry, settings())
}

fn request(topic: &str, max_items: usize, sources: &[Source]) -> HarvestRequest {
    HarvestRequest {
        topic: topic.to_string(),
        max_items,
        sources: sources.to_vec(),
    }
}

async fn wait_exhausted(sup: &HarvestSupervisor) {
    tokio::time::timeout(Duration::from_secs(5), sup.wait_until_exhausted())
        .await
        .expect("workers did not finish");
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_sources_with_three_publications_each_store_six_rows() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(
        &pool,
        vec![
            Arc::new(Scripted {
                source: Source::Reddit,
                items: three_publications("RD"),
            }),
            Arc::new(Scripted {
                source: Source::Twitter,
                items: three_publications("TW"),
            }),
        ],
    );

    let run_id = sup
        .start(request("climate policy", 50, &[Source::Reddit, Source::Twitter]))
        .await
        .unwrap();
    wait_exhausted(&sup).await;
    let summary = sup.stop().await.unwrap();

    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.total_inserted(), 6);
    assert!(!summary.is_empty());
    assert!(summary.crashed.is_empty() && summary.aborted.is_empty());

    for source in [Source::Reddit, Source::Twitter] {
        let rows = murmur_db::list_publications(&pool, source, "climate policy")
            .await
            .unwrap();
        assert_eq!(rows.len(), 3, "rows for {source}");
    }

    let ledger = murmur_db::get_run(&pool, run_id).await.unwrap();
    assert_eq!(ledger.status, "succeeded");
    assert_eq!(ledger.records_processed, 6);
    assert_eq!(sup.status().state, HarvestState::Stopped);
}

#[tokio::test]
async fn immediate_stop_with_nothing_queued_is_empty_not_an_error() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(&pool, vec![Arc::new(Idle(Source::Reddit))]);

    sup.start(request("climate policy", 10, &[Source::Reddit]))
        .await
        .unwrap();
    let summary = sup.stop().await.unwrap();

    assert!(summary.is_empty());
    assert!(summary.to_string().contains("nothing processed"));
    assert!(summary.failed.is_empty());
    assert_eq!(sup.status().state, HarvestState::Stopped);
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(&pool, vec![Arc::new(Idle(Source::Reddit))]);

    let first = sup.start(request("a", 10, &[Source::Reddit])).await.unwrap();
    let second = sup.start(request("b", 10, &[Source::Reddit])).await;
    assert!(
        matches!(second, Err(HarvestError::AlreadyRunning)),
        "expected AlreadyRunning, got: {second:?}"
    );
    assert_eq!(sup.status().topic.as_deref(), Some("a"));

    sup.stop().await.unwrap();
    let third = sup.start(request("b", 10, &[Source::Reddit])).await.unwrap();
    assert_ne!(first, third);
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn stop_without_run_is_rejected() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(&pool, vec![]);
    assert_eq!(sup.status().state, HarvestState::Idle);
    assert!(matches!(sup.stop().await, Err(HarvestError::NotRunning)));
}

#[tokio::test]
async fn malformed_requests_are_invalid_input() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(&pool, vec![Arc::new(Idle(Source::Reddit))]);

    let cases = [
        request("   ", 10, &[Source::Reddit]),
        request("t", 0, &[Source::Reddit]),
        request("t", 501, &[Source::Reddit]),
        request("t", 10, &[]),
        request("t", 10, &[Source::Instagram]),
    ];
    for case in cases {
        let result = sup.start(case.clone()).await;
        assert!(
            matches!(result, Err(HarvestError::InvalidInput(_))),
            "expected InvalidInput for {case:?}, got: {result:?}"
        );
    }
    assert_eq!(sup.status().state, HarvestState::Idle);
    assert!(murmur_db::list_recent_runs(&pool, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn crashing_worker_does_not_affect_siblings() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(
        &pool,
        vec![
            Arc::new(Scripted {
                source: Source::Reddit,
                items: three_publications("RD"),
            }),
            Arc::new(Panicking(Source::Twitter)),
        ],
    );

    sup.start(request("t", 10, &[Source::Reddit, Source::Twitter]))
        .await
        .unwrap();
    wait_exhausted(&sup).await;
    let summary = sup.stop().await.unwrap();

    assert_eq!(summary.crashed, vec![Source::Twitter]);
    assert_eq!(summary.total_inserted(), 3);
}

#[tokio::test]
async fn worker_ignoring_stop_is_force_terminated() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(
        &pool,
        vec![
            Arc::new(Scripted {
                source: Source::Reddit,
                items: three_publications("RD"),
            }),
            Arc::new(Stubborn(Source::Facebook)),
        ],
    );

    sup.start(request("t", 10, &[Source::Reddit, Source::Facebook]))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = tokio::time::timeout(Duration::from_secs(5), sup.stop())
        .await
        .expect("stop must be bounded")
        .unwrap();
    assert_eq!(summary.aborted, vec![Source::Facebook]);
    assert_eq!(summary.total_inserted(), 3);
    assert!(!summary.writer_aborted);
}

#[tokio::test]
async fn reharvesting_the_same_items_adds_no_rows() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(
        &pool,
        vec![Arc::new(Scripted {
            source: Source::Reddit,
            items: three_publications("RD"),
        })],
    );

    for _ in 0..2 {
        sup.start(request("t", 10, &[Source::Reddit])).await.unwrap();
        wait_exhausted(&sup).await;
        sup.stop().await.unwrap();
    }
    let rows = murmur_db::list_publications(&pool, Source::Reddit, "t")
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);

    sup.start(request("t", 10, &[Source::Reddit])).await.unwrap();
    wait_exhausted(&sup).await;
    let summary = sup.stop().await.unwrap();
    assert_eq!(summary.total_inserted(), 0);
    assert_eq!(summary.total_duplicate(), 3);
    assert!(!summary.is_empty());
}

#[tokio::test]
async fn item_limit_caps_each_source() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(
        &pool,
        vec![Arc::new(Scripted {
            source: Source::LinkedIn,
            items: numbered("LI", 10),
        })],
    );

    sup.start(request("t", 4, &[Source::LinkedIn])).await.unwrap();
    wait_exhausted(&sup).await;
    let summary = sup.stop().await.unwrap();

    assert_eq!(summary.total_inserted(), 4);
    assert_eq!(summary.sources[0].accepted, 4);
}

#[tokio::test]
async fn repeated_ids_within_a_run_are_emitted_once() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let mut items = three_publications("RD");
    items.push(item("RD_1", "the same post seen again on a later page"));
    let sup = supervisor(
        &pool,
        vec![Arc::new(Scripted {
            source: Source::Reddit,
            items,
        })],
    );

    sup.start(request("t", 10, &[Source::Reddit])).await.unwrap();
    wait_exhausted(&sup).await;
    let summary = sup.stop().await.unwrap();

    assert_eq!(summary.sources[0].accepted, 3);
    assert_eq!(summary.total_duplicate(), 0);
}

#[tokio::test]
async fn run_where_every_worker_fails_is_marked_failed() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(&pool, vec![Arc::new(LoginFails(Source::Instagram))]);

    let run_id = sup
        .start(request("t", 10, &[Source::Instagram]))
        .await
        .unwrap();
    wait_exhausted(&sup).await;
    let summary = sup.stop().await.unwrap();

    assert!(summary.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].1.contains("403"));

    let ledger = murmur_db::get_run(&pool, run_id).await.unwrap();
    assert_eq!(ledger.status, "failed");
}

#[tokio::test]
async fn status_reports_live_counters_and_events() {
    let pool = murmur_db::connect_in_memory().await.unwrap();
    let sup = supervisor(
        &pool,
        vec![Arc::new(Scripted {
            source: Source::Reddit,
            items: three_publications("RD"),
        })],
    );

    sup.start(request("climate policy", 10, &[Source::Reddit]))
        .await
        .unwrap();
    wait_exhausted(&sup).await;

    let running = sup.status();
    assert_eq!(running.state, HarvestState::Running);
    assert_eq!(running.sources, vec![Source::Reddit]);
    assert_eq!(running.counters[0].accepted, 3);

    sup.stop().await.unwrap();
    let stopped = sup.status();
    assert_eq!(stopped.state, HarvestState::Stopped);
    assert_eq!(stopped.counters[0].inserted, 3);

    let messages: Vec<&str> = stopped.events.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.first().unwrap().contains("started"));
    assert!(messages.iter().any(|m| m.contains("reddit worker finished with 3 items")));
    assert!(messages.last().unwrap().contains("stopped"));
}

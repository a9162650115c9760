//! Harvest Run Supervisor: owns the lifecycle of one harvest run at a time.
//!
//! `Idle -> Running -> Stopping -> Stopped`. A run spawns one Ingestion Writer
//! and one Source Worker per requested source. Stopping cancels the shared
//! token, joins the workers and then the writer against a bounded deadline,
//! and aborts whatever is still alive.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use murmur_core::config::MAX_ITEMS_LIMIT;
use murmur_core::{AppConfig, Source};
use murmur_db::RunType;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapter::{SourceAdapter, WorkerSink};
use crate::counters::{HarvestCounters, SourceTally};
use crate::error::HarvestError;
use crate::registry::SourceRegistry;
use crate::worker::{run_worker, LiveWorkerGuard, WorkerExit};
use crate::writer::{IngestionWriter, WriterReport};

const EVENT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRequest {
    pub topic: String,
    pub max_items: usize,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub channel_capacity: usize,
    /// Deadline for workers, and separately for the writer, after stop.
    pub stop_timeout: Duration,
    /// Recorded in the run ledger.
    pub trigger_source: String,
}

impl HarvestSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, trigger_source: &str) -> Self {
        Self {
            channel_capacity: config.harvest_channel_capacity,
            stop_timeout: Duration::from_secs(config.harvest_stop_timeout_secs),
            trigger_source: trigger_source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HarvestState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HarvestState::Idle => "idle",
            HarvestState::Running => "running",
            HarvestState::Stopping => "stopping",
            HarvestState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestEvent {
    pub at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarvestStatus {
    pub state: HarvestState,
    pub run_id: Option<Uuid>,
    pub topic: Option<String>,
    pub sources: Vec<Source>,
    pub counters: Vec<SourceTally>,
    /// Oldest first.
    pub events: Vec<HarvestEvent>,
}

/// Outcome of a stopped harvest run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    pub run_id: Uuid,
    pub topic: String,
    pub sources: Vec<SourceTally>,
    /// Workers that returned a worker-local error, with its message.
    pub failed: Vec<(Source, String)>,
    /// Workers that panicked.
    pub crashed: Vec<Source>,
    /// Workers force-terminated after the stop deadline.
    pub aborted: Vec<Source>,
    pub writer_aborted: bool,
    pub elapsed_seconds: f64,
}

impl HarvestSummary {
    #[must_use]
    pub fn total_inserted(&self) -> usize {
        self.sources.iter().map(|t| t.inserted).sum()
    }

    #[must_use]
    pub fn total_duplicate(&self) -> usize {
        self.sources.iter().map(|t| t.duplicate).sum()
    }

    #[must_use]
    pub fn total_dropped(&self) -> usize {
        self.sources.iter().map(|t| t.dropped).sum()
    }

    /// True when nothing reached the store, neither new rows nor matches of
    /// rows already there.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_inserted() == 0 && self.total_duplicate() == 0
    }
}

impl fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(
                f,
                "harvest {} for topic '{}': nothing processed",
                self.run_id, self.topic
            )?;
        } else {
            writeln!(
                f,
                "harvest {} for topic '{}': {} new, {} already stored, {} dropped in {:.1}s",
                self.run_id,
                self.topic,
                self.total_inserted(),
                self.total_duplicate(),
                self.total_dropped(),
                self.elapsed_seconds
            )?;
        }
        for t in &self.sources {
            writeln!(
                f,
                "  {:<10} accepted={} inserted={} duplicate={} dropped={}",
                t.source, t.accepted, t.inserted, t.duplicate, t.dropped
            )?;
        }
        for (source, error) in &self.failed {
            writeln!(f, "  {source} failed: {error}")?;
        }
        for source in &self.crashed {
            writeln!(f, "  {source} crashed")?;
        }
        for source in &self.aborted {
            writeln!(f, "  {source} was force-terminated")?;
        }
        if self.writer_aborted {
            writeln!(f, "  ingestion writer did not finish cleanly")?;
        }
        Ok(())
    }
}

struct RunView {
    public_id: Uuid,
    topic: String,
    sources: Vec<Source>,
    counters: Arc<HarvestCounters>,
    exhausted: CancellationToken,
}

struct Shared {
    state: HarvestState,
    run: Option<RunView>,
    events: VecDeque<HarvestEvent>,
}

impl Shared {
    fn record(&mut self, message: String) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(HarvestEvent {
            at: Utc::now(),
            message,
        });
    }
}

struct RunHandles {
    ledger_id: i64,
    public_id: Uuid,
    topic: String,
    stop: CancellationToken,
    workers: Vec<(Source, JoinHandle<WorkerExit>)>,
    writer: JoinHandle<WriterReport>,
    counters: Arc<HarvestCounters>,
    started: Instant,
}

pub struct HarvestSupervisor {
    pool: SqlitePool,
    registry: SourceRegistry,
    settings: HarvestSettings,
    shared: Arc<Mutex<Shared>>,
    active: tokio::sync::Mutex<Option<RunHandles>>,
}

impl HarvestSupervisor {
    #[must_use]
    pub fn new(pool: SqlitePool, registry: SourceRegistry, settings: HarvestSettings) -> Self {
        Self {
            pool,
            registry,
            settings,
            shared: Arc::new(Mutex::new(Shared {
                state: HarvestState::Idle,
                run: None,
                events: VecDeque::new(),
            })),
            active: tokio::sync::Mutex::new(None),
        }
    }

    /// Start a harvest run and return its public id.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::InvalidInput`] for a malformed request,
    /// [`HarvestError::AlreadyRunning`] if a run is running or stopping, and
    /// [`HarvestError::Db`] if the run cannot be recorded.
    pub async fn start(&self, request: HarvestRequest) -> Result<Uuid, HarvestError> {
        let (topic, adapters) = self.validate(&request)?;

        let Ok(mut active) = self.active.try_lock() else {
            return Err(HarvestError::AlreadyRunning);
        };
        if active.is_some() {
            return Err(HarvestError::AlreadyRunning);
        }

        let run = murmur_db::create_run(
            &self.pool,
            RunType::Harvest,
            &self.settings.trigger_source,
            &topic,
        )
        .await?;
        murmur_db::start_run(&self.pool, run.id).await?;

        let sources: Vec<Source> = adapters.iter().map(|a| a.source()).collect();
        let counters = Arc::new(HarvestCounters::new(&sources));
        let stop = CancellationToken::new();
        let exhausted = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);

        {
            let mut shared = lock(&self.shared);
            shared.state = HarvestState::Running;
            shared.run = Some(RunView {
                public_id: run.public_id,
                topic: topic.clone(),
                sources: sources.clone(),
                counters: Arc::clone(&counters),
                exhausted: exhausted.clone(),
            });
            shared.record(format!(
                "harvest {} started for '{topic}' on {}",
                run.public_id,
                join_sources(&sources)
            ));
        }

        let writer = tokio::spawn(
            IngestionWriter::new(self.pool.clone(), Some(run.public_id))
                .with_counters(Arc::clone(&counters))
                .drain(rx, stop.clone()),
        );

        let remaining = Arc::new(AtomicUsize::new(adapters.len()));
        let mut workers = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let source = adapter.source();
            let sink = WorkerSink::new(source, &topic, request.max_items, tx.clone(), stop.clone())
                .with_counters(Arc::clone(&counters));
            let guard = LiveWorkerGuard::new(Arc::clone(&remaining), exhausted.clone());
            let shared = Arc::clone(&self.shared);
            let topic = topic.clone();
            let stop = stop.clone();
            let max_items = request.max_items;

            let handle = tokio::spawn(async move {
                let _guard = guard;
                let exit = run_worker(adapter, topic, max_items, sink, stop).await;
                let message = match &exit.error {
                    Some(e) => format!("{} worker failed after {} items: {e}", exit.source, exit.emitted),
                    None => format!("{} worker finished with {} items", exit.source, exit.emitted),
                };
                lock(&shared).record(message);
                exit
            });
            workers.push((source, handle));
        }
        // Workers own the only senders now, so the channel closes once they are all gone.
        drop(tx);

        tracing::info!(
            run_id = %run.public_id,
            topic = %topic,
            sources = %join_sources(&sources),
            max_items = request.max_items,
            "harvest run started"
        );

        *active = Some(RunHandles {
            ledger_id: run.id,
            public_id: run.public_id,
            topic,
            stop,
            workers,
            writer,
            counters,
            started: Instant::now(),
        });
        Ok(run.public_id)
    }

    /// Resolve once every worker of the current run has returned. Resolves
    /// immediately when no run has been started.
    pub async fn wait_until_exhausted(&self) {
        let token = lock(&self.shared).run.as_ref().map(|r| r.exhausted.clone());
        if let Some(token) = token {
            token.cancelled().await;
        }
    }

    /// Stop the current run, drain the writer and finalize the ledger row.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::NotRunning`] if there is no run to stop.
    pub async fn stop(&self) -> Result<HarvestSummary, HarvestError> {
        let mut active = self.active.lock().await;
        let Some(run) = active.take() else {
            return Err(HarvestError::NotRunning);
        };

        {
            let mut shared = lock(&self.shared);
            shared.state = HarvestState::Stopping;
            shared.record(format!("stop requested for harvest {}", run.public_id));
        }
        tracing::info!(run_id = %run.public_id, "stopping harvest run");
        run.stop.cancel();

        let worker_count = run.workers.len();
        let mut failed = Vec::new();
        let mut crashed = Vec::new();
        let mut aborted = Vec::new();

        let deadline = tokio::time::Instant::now() + self.settings.stop_timeout;
        for (source, mut handle) in run.workers {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(exit)) => {
                    if let Some(error) = exit.error {
                        failed.push((source, error));
                    }
                }
                Ok(Err(e)) => {
                    tracing::error!(source = %source, error = %e, "source worker crashed");
                    crashed.push(source);
                }
                Err(_) => {
                    tracing::warn!(source = %source, "source worker did not stop in time, aborting");
                    handle.abort();
                    aborted.push(source);
                }
            }
        }

        let mut writer = run.writer;
        let writer_deadline = tokio::time::Instant::now() + self.settings.stop_timeout;
        let writer_aborted = match tokio::time::timeout_at(writer_deadline, &mut writer).await {
            Ok(Ok(_)) => false,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "ingestion writer crashed");
                true
            }
            Err(_) => {
                tracing::error!("ingestion writer did not drain in time, aborting");
                writer.abort();
                true
            }
        };

        let summary = HarvestSummary {
            run_id: run.public_id,
            topic: run.topic,
            sources: run.counters.snapshot(),
            failed,
            crashed,
            aborted,
            writer_aborted,
            elapsed_seconds: run.started.elapsed().as_secs_f64(),
        };

        self.finalize_ledger(run.ledger_id, worker_count, &summary)
            .await;

        {
            let mut shared = lock(&self.shared);
            shared.state = HarvestState::Stopped;
            let message = if summary.is_empty() {
                format!("harvest {} stopped: nothing processed", summary.run_id)
            } else {
                format!(
                    "harvest {} stopped: {} new publications",
                    summary.run_id,
                    summary.total_inserted()
                )
            };
            shared.record(message);
        }
        tracing::info!(
            run_id = %summary.run_id,
            inserted = summary.total_inserted(),
            duplicate = summary.total_duplicate(),
            dropped = summary.total_dropped(),
            crashed = summary.crashed.len(),
            aborted = summary.aborted.len(),
            "harvest run stopped"
        );

        Ok(summary)
    }

    #[must_use]
    pub fn status(&self) -> HarvestStatus {
        let shared = lock(&self.shared);
        let run = shared.run.as_ref();
        HarvestStatus {
            state: shared.state,
            run_id: run.map(|r| r.public_id),
            topic: run.map(|r| r.topic.clone()),
            sources: run.map(|r| r.sources.clone()).unwrap_or_default(),
            counters: run.map(|r| r.counters.snapshot()).unwrap_or_default(),
            events: shared.events.iter().cloned().collect(),
        }
    }

    fn validate(
        &self,
        request: &HarvestRequest,
    ) -> Result<(String, Vec<Arc<dyn SourceAdapter>>), HarvestError> {
        let topic = request.topic.trim();
        if topic.is_empty() {
            return Err(HarvestError::InvalidInput("topic must not be empty".into()));
        }
        if request.max_items == 0 || request.max_items > MAX_ITEMS_LIMIT {
            return Err(HarvestError::InvalidInput(format!(
                "max_items must be between 1 and {MAX_ITEMS_LIMIT}, got {}",
                request.max_items
            )));
        }
        if request.sources.is_empty() {
            return Err(HarvestError::InvalidInput(
                "at least one source is required".into(),
            ));
        }

        let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
        for source in &request.sources {
            if adapters.iter().any(|a| a.source() == *source) {
                continue;
            }
            let adapter = self.registry.get(*source).ok_or_else(|| {
                HarvestError::InvalidInput(format!("no adapter registered for source '{source}'"))
            })?;
            adapters.push(adapter);
        }
        Ok((topic.to_string(), adapters))
    }

    async fn finalize_ledger(&self, ledger_id: i64, worker_count: usize, summary: &HarvestSummary) {
        let all_workers_failed =
            worker_count > 0 && summary.failed.len() + summary.crashed.len() == worker_count;

        let result = if summary.is_empty() && all_workers_failed {
            murmur_db::fail_run(&self.pool, ledger_id, "every source worker failed").await
        } else {
            let records = i64::try_from(summary.total_inserted()).unwrap_or(i64::MAX);
            murmur_db::complete_run(&self.pool, ledger_id, records).await
        };

        if let Err(e) = result {
            tracing::error!(run_id = %summary.run_id, error = %e, "failed to finalize harvest run");
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_sources(sources: &[Source]) -> String {
    sources
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

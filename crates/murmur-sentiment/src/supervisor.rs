//! Analysis Run Supervisor: one analysis run per (source, topic) key at a time.
//!
//! A request claims all of its keys up front. Each claimed source then runs
//! in its own task: load publications, fan out classification, render and
//! persist the report, and close the ledger row. Keys are released when the
//! task finishes, fails or panics.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use murmur_core::{AppConfig, Report, Source};
use murmur_db::{DbError, RunType};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classifier::SentimentClassifier;
use crate::coordinator::FanOutCoordinator;
use crate::error::AnalysisError;
use crate::metrics::RunMetrics;
use crate::report::{render_report, ReportContext};

type Key = (Source, String);
type InFlight = Arc<Mutex<HashSet<Key>>>;

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub concurrency_limit: usize,
    /// Recorded in the run ledger.
    pub trigger_source: String,
}

impl AnalysisSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig, trigger_source: &str) -> Self {
        Self {
            concurrency_limit: config.analysis_concurrency,
            trigger_source: trigger_source.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisState {
    Running,
    Completed,
    NothingProcessed,
    Failed,
}

impl std::fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AnalysisState::Running => "running",
            AnalysisState::Completed => "completed",
            AnalysisState::NothingProcessed => "nothing_processed",
            AnalysisState::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatus {
    pub source: Source,
    pub topic: String,
    pub state: AnalysisState,
    pub run_id: Option<Uuid>,
    pub publications: usize,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Result of analyzing one source under a topic.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source: Source,
    pub topic: String,
    pub state: AnalysisState,
    pub run_id: Option<Uuid>,
    pub report: Option<Report>,
    pub metrics: Option<RunMetrics>,
    pub error: Option<String>,
}

impl SourceOutcome {
    fn failed(source: Source, topic: String, run_id: Option<Uuid>, error: String) -> Self {
        Self {
            source,
            topic,
            state: AnalysisState::Failed,
            run_id,
            report: None,
            metrics: None,
            error: Some(error),
        }
    }
}

/// Releases its key from the in-flight set when dropped, including on unwind.
struct KeyClaim {
    key: Key,
    in_flight: InFlight,
}

impl Drop for KeyClaim {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
    }
}

struct Inner {
    pool: SqlitePool,
    classifier: Arc<SentimentClassifier>,
    settings: AnalysisSettings,
    in_flight: InFlight,
    statuses: Mutex<BTreeMap<Key, AnalysisStatus>>,
    /// Parent of every in-flight run's stop token; replaced on each cancel.
    cancel: Mutex<CancellationToken>,
}

#[derive(Clone)]
pub struct AnalysisSupervisor {
    inner: Arc<Inner>,
}

impl AnalysisSupervisor {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        classifier: Arc<SentimentClassifier>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                classifier,
                settings,
                in_flight: Arc::new(Mutex::new(HashSet::new())),
                statuses: Mutex::new(BTreeMap::new()),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Analyze `sources` under `topic`, one concurrent task per source.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::InvalidInput`] for a blank topic or empty
    /// source list, and [`AnalysisError::Conflict`] if any key is already in
    /// flight. Per-source failures are reported in the outcomes instead.
    pub async fn run(
        &self,
        topic: &str,
        sources: &[Source],
    ) -> Result<Vec<SourceOutcome>, AnalysisError> {
        let claims = self.claim(topic, sources)?;
        Ok(execute(Arc::clone(&self.inner), claims).await)
    }

    /// Claim the keys now and run the analysis in the background.
    ///
    /// # Errors
    ///
    /// Same synchronous errors as [`run`](Self::run).
    pub fn spawn(
        &self,
        topic: &str,
        sources: &[Source],
    ) -> Result<JoinHandle<Vec<SourceOutcome>>, AnalysisError> {
        let claims = self.claim(topic, sources)?;
        Ok(tokio::spawn(execute(Arc::clone(&self.inner), claims)))
    }

    /// Latest known state of every key this supervisor has seen.
    #[must_use]
    pub fn status(&self) -> Vec<AnalysisStatus> {
        lock(&self.inner.statuses).values().cloned().collect()
    }

    /// Interrupt rate-limit backoff in the runs currently in flight. Runs
    /// started afterwards are unaffected.
    pub fn cancel(&self) {
        let previous = std::mem::replace(&mut *lock(&self.inner.cancel), CancellationToken::new());
        previous.cancel();
    }

    fn claim(&self, topic: &str, sources: &[Source]) -> Result<Vec<KeyClaim>, AnalysisError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(AnalysisError::InvalidInput("topic must not be empty".into()));
        }
        if sources.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "at least one source is required".into(),
            ));
        }

        let mut keys: Vec<Key> = sources.iter().map(|s| (*s, topic.to_string())).collect();
        keys.sort();
        keys.dedup();

        let mut in_flight = lock(&self.inner.in_flight);
        let busy: Vec<Key> = keys
            .iter()
            .filter(|k| in_flight.contains(*k))
            .cloned()
            .collect();
        if !busy.is_empty() {
            tracing::warn!(topic, busy = busy.len(), "analysis request conflicts with a run in flight");
            return Err(AnalysisError::Conflict(busy));
        }
        for key in &keys {
            in_flight.insert(key.clone());
        }
        drop(in_flight);

        Ok(keys
            .into_iter()
            .map(|key| KeyClaim {
                key,
                in_flight: Arc::clone(&self.inner.in_flight),
            })
            .collect())
    }
}

async fn execute(inner: Arc<Inner>, claims: Vec<KeyClaim>) -> Vec<SourceOutcome> {
    let now = Utc::now();
    {
        let mut statuses = lock(&inner.statuses);
        for claim in &claims {
            let (source, topic) = claim.key.clone();
            statuses.insert(
                claim.key.clone(),
                AnalysisStatus {
                    source,
                    topic,
                    state: AnalysisState::Running,
                    run_id: None,
                    publications: 0,
                    error: None,
                    updated_at: now,
                },
            );
        }
    }

    let stop = lock(&inner.cancel).child_token();
    let tasks: Vec<(Key, JoinHandle<SourceOutcome>)> = claims
        .into_iter()
        .map(|claim| {
            let key = claim.key.clone();
            let inner = Arc::clone(&inner);
            let stop = stop.clone();
            let handle = tokio::spawn(async move {
                let outcome = analyze_source(&inner, &claim.key, &stop).await;
                drop(claim);
                outcome
            });
            (key, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for ((source, topic), handle) in tasks {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(source = %source, topic = %topic, error = %e, "analysis task crashed");
                SourceOutcome::failed(source, topic, None, format!("analysis task crashed: {e}"))
            }
        };
        record_status(&inner, &outcome);
        outcomes.push(outcome);
    }
    outcomes
}

async fn analyze_source(inner: &Inner, key: &Key, stop: &CancellationToken) -> SourceOutcome {
    let (source, topic) = key.clone();
    let pool = &inner.pool;

    let run = match murmur_db::create_run(
        pool,
        RunType::Analysis,
        &inner.settings.trigger_source,
        &topic,
    )
    .await
    {
        Ok(run) => run,
        Err(e) => {
            tracing::error!(source = %source, topic = %topic, error = %e, "failed to record analysis run");
            return SourceOutcome::failed(source, topic, None, e.to_string());
        }
    };
    let run_id = Some(run.public_id);

    if let Err(e) = murmur_db::start_run(pool, run.id).await {
        tracing::error!(run_id = %run.public_id, error = %e, "failed to start analysis run");
        return SourceOutcome::failed(source, topic, run_id, e.to_string());
    }

    tracing::info!(run_id = %run.public_id, source = %source, topic = %topic, "analysis run started");

    match produce_report(inner, source, &topic, stop).await {
        Ok((report, metrics)) => {
            let processed = i64::try_from(report.analyses.len()).unwrap_or(i64::MAX);
            if let Err(e) = murmur_db::complete_run(pool, run.id, processed).await {
                tracing::warn!(run_id = %run.public_id, error = %e, "failed to mark analysis run succeeded");
            }
            let state = if report.analyses.is_empty() {
                AnalysisState::NothingProcessed
            } else {
                AnalysisState::Completed
            };
            tracing::info!(
                run_id = %run.public_id,
                source = %source,
                topic = %topic,
                publications = report.analyses.len(),
                state = %state,
                wall_clock_seconds = metrics.wall_clock_seconds,
                "analysis run finished"
            );
            SourceOutcome {
                source,
                topic,
                state,
                run_id,
                report: Some(report),
                metrics: Some(metrics),
                error: None,
            }
        }
        Err(e) => {
            tracing::error!(run_id = %run.public_id, source = %source, error = %e, "analysis run failed");
            if let Err(mark_err) = murmur_db::fail_run(pool, run.id, &e.to_string()).await {
                tracing::warn!(run_id = %run.public_id, error = %mark_err, "failed to mark analysis run failed");
            }
            SourceOutcome::failed(source, topic, run_id, e.to_string())
        }
    }
}

async fn produce_report(
    inner: &Inner,
    source: Source,
    topic: &str,
    stop: &CancellationToken,
) -> Result<(Report, RunMetrics), DbError> {
    let publications = murmur_db::list_publications(&inner.pool, source, topic).await?;
    let coordinator = FanOutCoordinator::new(
        Arc::clone(&inner.classifier),
        inner.settings.concurrency_limit,
    );
    let (analyses, metrics) = coordinator.analyze(&publications, stop).await;

    let context = ReportContext {
        source,
        topic: topic.to_string(),
        created_at: Utc::now(),
        model: inner.classifier.model().to_string(),
        concurrency_limit: coordinator.concurrency_limit(),
    };
    let report = Report {
        source,
        topic: topic.to_string(),
        report_text: render_report(&context, &analyses, &metrics),
        model: context.model,
        concurrency_limit: context.concurrency_limit,
        analyses,
        created_at: context.created_at,
    };
    murmur_db::persist_report(&inner.pool, &report).await?;
    Ok((report, metrics))
}

fn record_status(inner: &Inner, outcome: &SourceOutcome) {
    let status = AnalysisStatus {
        source: outcome.source,
        topic: outcome.topic.clone(),
        state: outcome.state,
        run_id: outcome.run_id,
        publications: outcome.report.as_ref().map_or(0, |r| r.analyses.len()),
        error: outcome.error.clone(),
        updated_at: Utc::now(),
    };
    lock(&inner.statuses).insert((outcome.source, outcome.topic.clone()), status);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

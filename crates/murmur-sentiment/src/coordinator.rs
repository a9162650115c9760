//! Fan-out of text units across a bounded pool of classification tasks.

use std::sync::Arc;
use std::time::Instant;

use murmur_core::{
    decompose, majority_label, Publication, PublicationAnalysis, SentimentLabel, UnitKind,
    UnitSentiment,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::classifier::SentimentClassifier;
use crate::metrics::RunMetrics;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 10;

struct TimedUnit {
    result: UnitSentiment,
    started: Instant,
    finished: Instant,
}

pub struct FanOutCoordinator {
    classifier: Arc<SentimentClassifier>,
    concurrency_limit: usize,
}

impl FanOutCoordinator {
    /// A limit of zero is treated as one.
    #[must_use]
    pub fn new(classifier: Arc<SentimentClassifier>, concurrency_limit: usize) -> Self {
        Self {
            classifier,
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Classify every unit of every publication and aggregate per publication.
    ///
    /// All units are spawned up front; a semaphore keeps at most
    /// `concurrency_limit` of them inside the classifier at once. Results come
    /// back in input order regardless of completion order.
    pub async fn analyze(
        &self,
        publications: &[Publication],
        stop: &CancellationToken,
    ) -> (Vec<PublicationAnalysis>, RunMetrics) {
        let run_started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));

        let mut tasks: Vec<(usize, UnitKind, JoinHandle<TimedUnit>)> = Vec::new();
        for (index, publication) in publications.iter().enumerate() {
            for unit in decompose(&publication.raw_text) {
                let kind = unit.kind;
                let semaphore = Arc::clone(&semaphore);
                let classifier = Arc::clone(&self.classifier);
                let stop = stop.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    let started = Instant::now();
                    let result = classifier.classify_until(&unit.text, unit.kind, &stop).await;
                    TimedUnit {
                        result,
                        started,
                        finished: Instant::now(),
                    }
                });
                tasks.push((index, kind, handle));
            }
        }

        tracing::info!(
            publications = publications.len(),
            units = tasks.len(),
            concurrency_limit = self.concurrency_limit,
            "dispatched text units"
        );

        let mut units: Vec<Vec<UnitSentiment>> = vec![Vec::new(); publications.len()];
        let mut spans: Vec<Option<(Instant, Instant)>> = vec![None; publications.len()];
        let mut call_latencies = Vec::with_capacity(tasks.len());

        for (index, kind, handle) in tasks {
            let result = match handle.await {
                Ok(timed) => {
                    let span = spans[index].get_or_insert((timed.started, timed.finished));
                    span.0 = span.0.min(timed.started);
                    span.1 = span.1.max(timed.finished);
                    timed.result
                }
                Err(e) => {
                    tracing::error!(
                        publication_id = %publications[index].id,
                        unit = %kind,
                        error = %e,
                        "classification task failed"
                    );
                    UnitSentiment {
                        kind,
                        label: SentimentLabel::Error,
                        explanation: format!("classification task failed: {e}"),
                        latency_seconds: 0.0,
                    }
                }
            };
            call_latencies.push(result.latency_seconds);
            units[index].push(result);
        }

        let analyses: Vec<PublicationAnalysis> = publications
            .iter()
            .zip(units)
            .zip(spans)
            .map(|((publication, units), span)| {
                let processing_seconds =
                    span.map_or(0.0, |(first, last)| (last - first).as_secs_f64());
                assemble(&publication.id, units, processing_seconds)
            })
            .collect();

        let metrics = RunMetrics {
            wall_clock_seconds: run_started.elapsed().as_secs_f64(),
            publication_seconds: analyses.iter().map(|a| a.processing_seconds).collect(),
            call_latencies,
        };

        tracing::info!(
            publications = analyses.len(),
            wall_clock_seconds = metrics.wall_clock_seconds,
            "analysis fan-out finished"
        );

        (analyses, metrics)
    }
}

fn assemble(
    publication_id: &str,
    mut units: Vec<UnitSentiment>,
    processing_seconds: f64,
) -> PublicationAnalysis {
    units.sort_by_key(|u| u.kind);
    let overall_label = majority_label(units.iter().map(|u| u.label));

    let mut units = units.into_iter().peekable();
    let post_result = units.next_if(|u| u.kind == UnitKind::Post);

    PublicationAnalysis {
        publication_id: publication_id.to_string(),
        overall_label,
        post_result,
        comment_results: units.collect(),
        processing_seconds,
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;

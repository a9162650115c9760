//! The Ingestion Writer: sole consumer of the harvest channel and sole writer
//! of the `publications` table during a harvest run.

use std::sync::Arc;

use murmur_core::Publication;
use murmur_db::InsertOutcome;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::counters::{Counter, HarvestCounters};

/// Totals for one writer lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub received: usize,
    pub inserted: usize,
    pub duplicate: usize,
    pub dropped: usize,
}

pub struct IngestionWriter {
    pool: SqlitePool,
    run_id: Option<Uuid>,
    counters: Option<Arc<HarvestCounters>>,
    report: WriterReport,
}

impl IngestionWriter {
    #[must_use]
    pub fn new(pool: SqlitePool, run_id: Option<Uuid>) -> Self {
        Self {
            pool,
            run_id,
            counters: None,
            report: WriterReport::default(),
        }
    }

    pub(crate) fn with_counters(mut self, counters: Arc<HarvestCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Persist everything arriving on `rx` until either every sender is gone,
    /// or `stop` is set and the buffered items have been written.
    pub async fn drain(
        mut self,
        mut rx: mpsc::Receiver<Publication>,
        stop: CancellationToken,
    ) -> WriterReport {
        tracing::info!(run_id = ?self.run_id, "ingestion writer started");

        loop {
            tokio::select! {
                biased;
                next = rx.recv() => match next {
                    Some(publication) => self.persist(publication).await,
                    None => break,
                },
                () = stop.cancelled() => {
                    self.drain_buffered(&mut rx).await;
                    break;
                }
            }
        }

        tracing::info!(
            received = self.report.received,
            inserted = self.report.inserted,
            duplicate = self.report.duplicate,
            dropped = self.report.dropped,
            "ingestion writer finished"
        );
        self.report
    }

    /// After `close`, `recv` yields `None` only once the buffer is empty and
    /// no sender still holds a reserved slot.
    async fn drain_buffered(&mut self, rx: &mut mpsc::Receiver<Publication>) {
        rx.close();
        while let Some(publication) = rx.recv().await {
            self.persist(publication).await;
        }
    }

    async fn persist(&mut self, publication: Publication) {
        self.report.received += 1;
        let source = publication.source;

        let clean = match publication.sanitized() {
            Ok(clean) => clean,
            Err(reason) => {
                tracing::warn!(
                    source = %source,
                    id = %publication.id,
                    reason = %reason,
                    "dropping publication that cannot be stored"
                );
                self.count(source, Counter::Dropped);
                return;
            }
        };

        match murmur_db::insert_publication(&self.pool, &clean, self.run_id).await {
            Ok(InsertOutcome::Inserted) => {
                tracing::debug!(source = %source, id = %clean.id, "publication stored");
                self.count(source, Counter::Inserted);
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!(source = %source, id = %clean.id, "publication already stored");
                self.count(source, Counter::Duplicate);
            }
            Err(e) => {
                tracing::error!(
                    source = %source,
                    id = %clean.id,
                    error = %e,
                    "failed to persist publication"
                );
                self.count(source, Counter::Dropped);
            }
        }
    }

    fn count(&mut self, source: murmur_core::Source, counter: Counter) {
        match counter {
            Counter::Inserted => self.report.inserted += 1,
            Counter::Duplicate => self.report.duplicate += 1,
            Counter::Dropped => self.report.dropped += 1,
            Counter::Accepted => {}
        }
        if let Some(counters) = &self.counters {
            counters.bump(source, counter);
        }
    }
}

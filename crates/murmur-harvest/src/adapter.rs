//! The narrow interface between a source adapter and its Source Worker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use murmur_core::{Publication, Source};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::counters::{Counter, HarvestCounters};
use crate::error::SourceError;

/// What an adapter extracts for one post. The worker stamps the source,
/// topic and request time so an adapter cannot file records under the wrong key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedItem {
    pub id: String,
    pub published_at: String,
    pub raw_text: String,
}

/// A platform-specific producer of publications.
///
/// Implementations should check `stop` (or [`WorkerSink::should_continue`])
/// between extraction steps and return once it is set. Work already in flight
/// may finish first.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// # Errors
    ///
    /// Returns [`SourceError`] on an irrecoverable failure. The worker logs it
    /// and the run continues without this source.
    async fn run(
        &self,
        topic: &str,
        max_items: usize,
        sink: &mut WorkerSink,
        stop: &CancellationToken,
    ) -> Result<(), SourceError>;
}

/// Result of handing one item to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Queued for the writer; keep going.
    Accepted,
    /// Already emitted in this run; skipped, keep going.
    Duplicate,
    /// The item limit is reached; the adapter should return.
    Full,
    /// Stop was requested or the writer is gone; the adapter should return.
    Stopped,
}

impl SinkStatus {
    #[must_use]
    pub fn should_continue(self) -> bool {
        matches!(self, SinkStatus::Accepted | SinkStatus::Duplicate)
    }
}

/// Output side of a Source Worker.
///
/// Enforces per-run deduplication, the item limit and the stop signal before
/// anything reaches the shared channel.
pub struct WorkerSink {
    source: Source,
    topic: String,
    requested_at: DateTime<Utc>,
    max_items: usize,
    seen: HashSet<String>,
    emitted: usize,
    tx: mpsc::Sender<Publication>,
    stop: CancellationToken,
    counters: Option<Arc<HarvestCounters>>,
}

impl WorkerSink {
    #[must_use]
    pub fn new(
        source: Source,
        topic: &str,
        max_items: usize,
        tx: mpsc::Sender<Publication>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            source,
            topic: topic.to_string(),
            requested_at: Utc::now(),
            max_items,
            seen: HashSet::new(),
            emitted: 0,
            tx,
            stop,
            counters: None,
        }
    }

    pub(crate) fn with_counters(mut self, counters: Arc<HarvestCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Number of items accepted so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.max_items.saturating_sub(self.emitted)
    }

    #[must_use]
    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// False once the limit is reached or stop has been requested.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        self.remaining() > 0 && !self.stop.is_cancelled()
    }

    /// Queue one item for the writer.
    pub async fn emit(&mut self, item: HarvestedItem) -> SinkStatus {
        if self.stop.is_cancelled() {
            return SinkStatus::Stopped;
        }
        if self.remaining() == 0 {
            return SinkStatus::Full;
        }
        if self.seen.contains(&item.id) {
            tracing::debug!(source = %self.source, id = %item.id, "skipping already-emitted item");
            return SinkStatus::Duplicate;
        }

        let publication = Publication {
            id: item.id.clone(),
            source: self.source,
            topic: self.topic.clone(),
            requested_at: self.requested_at,
            published_at: item.published_at,
            raw_text: item.raw_text,
        };

        tokio::select! {
            biased;
            sent = self.tx.send(publication) => {
                if sent.is_err() {
                    tracing::debug!(source = %self.source, "writer channel closed");
                    return SinkStatus::Stopped;
                }
            }
            () = self.stop.cancelled() => return SinkStatus::Stopped,
        }

        self.seen.insert(item.id);
        self.emitted += 1;
        if let Some(counters) = &self.counters {
            counters.bump(self.source, Counter::Accepted);
        }
        tracing::debug!(source = %self.source, emitted = self.emitted, "item queued");

        if self.remaining() == 0 {
            SinkStatus::Full
        } else {
            SinkStatus::Accepted
        }
    }
}

/// Sleep for `duration` unless `stop` fires first. Returns `false` if stopped.
pub async fn cancellable_sleep(duration: Duration, stop: &CancellationToken) -> bool {
    if stop.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = stop.cancelled() => false,
    }
}

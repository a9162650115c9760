//! One Source Worker: runs a single adapter in isolation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use murmur_core::Source;
use tokio_util::sync::CancellationToken;

use crate::adapter::{SourceAdapter, WorkerSink};

/// How a worker finished when it returned normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub source: Source,
    pub emitted: usize,
    /// Worker-local failure, already logged.
    pub error: Option<String>,
}

/// Run `adapter` to completion. Adapter errors are absorbed here and reported
/// in the returned [`WorkerExit`]; they never reach the supervisor as errors.
pub async fn run_worker(
    adapter: Arc<dyn SourceAdapter>,
    topic: String,
    max_items: usize,
    mut sink: WorkerSink,
    stop: CancellationToken,
) -> WorkerExit {
    let source = adapter.source();
    tracing::info!(source = %source, topic = %topic, max_items, "source worker started");

    let error = match adapter.run(&topic, max_items, &mut sink, &stop).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(source = %source, topic = %topic, error = %e, "source worker failed");
            Some(e.to_string())
        }
    };

    let emitted = sink.emitted();
    tracing::info!(
        source = %source,
        emitted,
        stopped = stop.is_cancelled(),
        "source worker finished"
    );

    WorkerExit {
        source,
        emitted,
        error,
    }
}

/// Decrements the live-worker count when dropped and fires `exhausted` once
/// the last worker is gone, whether it returned, panicked or was aborted.
pub(crate) struct LiveWorkerGuard {
    remaining: Arc<AtomicUsize>,
    exhausted: CancellationToken,
}

impl LiveWorkerGuard {
    pub(crate) fn new(remaining: Arc<AtomicUsize>, exhausted: CancellationToken) -> Self {
        Self {
            remaining,
            exhausted,
        }
    }
}

impl Drop for LiveWorkerGuard {
    fn drop(&mut self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.exhausted.cancel();
        }
    }
}

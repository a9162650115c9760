//! Live per-source tallies shared by the workers, the writer and `status()`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use murmur_core::Source;
use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct SourceCounters {
    accepted: AtomicUsize,
    inserted: AtomicUsize,
    duplicate: AtomicUsize,
    dropped: AtomicUsize,
}

/// Point-in-time copy of one source's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceTally {
    pub source: Source,
    /// Items the worker passed to the writer.
    pub accepted: usize,
    /// New rows written.
    pub inserted: usize,
    /// Items whose key was already stored.
    pub duplicate: usize,
    /// Items that could not be coerced into storage shape or failed to persist.
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub(crate) struct HarvestCounters {
    by_source: BTreeMap<Source, SourceCounters>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    Accepted,
    Inserted,
    Duplicate,
    Dropped,
}

impl HarvestCounters {
    pub(crate) fn new(sources: &[Source]) -> Self {
        Self {
            by_source: sources
                .iter()
                .map(|s| (*s, SourceCounters::default()))
                .collect(),
        }
    }

    pub(crate) fn bump(&self, source: Source, counter: Counter) {
        let Some(c) = self.by_source.get(&source) else {
            return;
        };
        let cell = match counter {
            Counter::Accepted => &c.accepted,
            Counter::Inserted => &c.inserted,
            Counter::Duplicate => &c.duplicate,
            Counter::Dropped => &c.dropped,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Vec<SourceTally> {
        self.by_source
            .iter()
            .map(|(source, c)| SourceTally {
                source: *source,
                accepted: c.accepted.load(Ordering::Relaxed),
                inserted: c.inserted.load(Ordering::Relaxed),
                duplicate: c.duplicate.load(Ordering::Relaxed),
                dropped: c.dropped.load(Ordering::Relaxed),
            })
            .collect()
    }
}

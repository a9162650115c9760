//! Harvesting: source adapters feed isolated workers, whose output funnels
//! through one bounded channel into a single Ingestion Writer.

pub mod adapter;
mod counters;
pub mod error;
pub mod registry;
pub mod sources;
pub mod supervisor;
pub mod worker;
pub mod writer;

pub use adapter::{cancellable_sleep, HarvestedItem, SinkStatus, SourceAdapter, WorkerSink};
pub use counters::SourceTally;
pub use error::{HarvestError, SourceError};
pub use registry::SourceRegistry;
pub use sources::{RedditAdapter, RedditConfig, ReplayAdapter, ReplayRecord};
pub use supervisor::{
    HarvestEvent, HarvestRequest, HarvestSettings, HarvestState, HarvestStatus, HarvestSummary,
    HarvestSupervisor,
};
pub use worker::{run_worker, WorkerExit};
pub use writer::{IngestionWriter, WriterReport};

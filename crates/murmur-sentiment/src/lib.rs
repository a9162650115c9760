//! Sentiment analysis of harvested publications.
//!
//! Each publication is decomposed into text units, every unit is classified
//! by an external completion API under a shared concurrency cap, and the
//! per-publication majority vote is rendered into a report per source.

pub mod backoff;
pub mod classifier;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod parse;
pub mod report;
pub mod summary;
pub mod supervisor;

pub use backoff::{retry_rate_limited, BackoffPolicy};
pub use classifier::{ClassifierStats, ClassifierStatsSnapshot, SentimentClassifier};
pub use client::{CompletionClient, OpenAiCompatClient};
pub use coordinator::{FanOutCoordinator, DEFAULT_CONCURRENCY_LIMIT};
pub use error::{AnalysisError, CompletionError};
pub use metrics::RunMetrics;
pub use report::{render_report, ReportContext, NOTHING_PROCESSED};
pub use summary::{summarize, topic_summary, SourceSummary, TopicSummary};
pub use supervisor::{
    AnalysisSettings, AnalysisState, AnalysisStatus, AnalysisSupervisor, SourceOutcome,
};

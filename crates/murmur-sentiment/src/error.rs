use murmur_core::Source;
use murmur_db::DbError;
use thiserror::Error;

/// Failure of one external completion call.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Rate limit or quota exhaustion. The only retriable variant.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("completion API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected completion response: {0}")]
    InvalidResponse(String),

    #[error("completion API not configured")]
    NotConfigured,

    #[error("cancelled")]
    Cancelled,
}

impl CompletionError {
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CompletionError::RateLimited(_))
    }
}

/// Failure of an analysis request, surfaced to the caller.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis already in progress for {}", describe_keys(.0))]
    Conflict(Vec<(Source, String)>),

    #[error("invalid analysis request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

fn describe_keys(keys: &[(Source, String)]) -> String {
    keys.iter()
        .map(|(source, topic)| format!("{source}/'{topic}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

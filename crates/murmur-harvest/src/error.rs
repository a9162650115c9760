use murmur_core::Source;
use murmur_db::DbError;
use thiserror::Error;

/// Failure inside one source adapter. Always worker-local.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} returned status {status} for {url}")]
    Status {
        platform: Source,
        status: u16,
        url: String,
    },

    #[error("unexpected response from {platform}: {reason}")]
    Parse { platform: Source, reason: String },

    #[error("replay file error: {0}")]
    Replay(#[from] std::io::Error),
}

/// Failure of a harvest run request, surfaced to the caller.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("a harvest run is already in progress")]
    AlreadyRunning,

    #[error("no harvest run is in progress")]
    NotRunning,

    #[error("invalid harvest request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

pub mod app_config;
pub mod config;
pub mod publication;
pub mod sentiment;
pub mod source;
pub mod text;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use publication::{InvalidPublication, Publication};
pub use sentiment::{
    majority_label, LabelCounts, PublicationAnalysis, Report, SentimentLabel, UnitKind,
    UnitSentiment,
};
pub use source::{ParseSourceError, Source};
pub use text::{decompose, recombine, sanitize, TextUnit, RAW_TEXT_MAX_CHARS, UNIT_TEXT_MAX_CHARS};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide settings for both harvesting and analysis runs.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub harvest_max_items: usize,
    pub harvest_stop_timeout_secs: u64,
    pub harvest_channel_capacity: usize,
    pub harvest_request_timeout_secs: u64,
    pub harvest_inter_request_delay_ms: u64,
    pub harvest_user_agent: String,
    /// When set, every source is served from this JSON-lines file instead of the network.
    pub replay_path: Option<PathBuf>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub analysis_concurrency: usize,
    pub llm_max_retries: u32,
    pub llm_backoff_base_ms: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("harvest_max_items", &self.harvest_max_items)
            .field("harvest_stop_timeout_secs", &self.harvest_stop_timeout_secs)
            .field("harvest_channel_capacity", &self.harvest_channel_capacity)
            .field(
                "harvest_request_timeout_secs",
                &self.harvest_request_timeout_secs,
            )
            .field(
                "harvest_inter_request_delay_ms",
                &self.harvest_inter_request_delay_ms,
            )
            .field("harvest_user_agent", &self.harvest_user_agent)
            .field("replay_path", &self.replay_path)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("analysis_concurrency", &self.analysis_concurrency)
            .field("llm_max_retries", &self.llm_max_retries)
            .field("llm_backoff_base_ms", &self.llm_backoff_base_ms)
            .finish()
    }
}

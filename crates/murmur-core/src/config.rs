use std::path::PathBuf;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Upper bound accepted for `MURMUR_HARVEST_MAX_ITEMS`.
pub const MAX_ITEMS_LIMIT: usize = 500;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the variables already in the process.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Parse and validate configuration through `lookup`, so tests can feed a
/// plain map instead of touching the process environment.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = or_default("DATABASE_URL", "sqlite://data/murmur.db");
    let env = parse_environment(&or_default("MURMUR_ENV", "development"))?;
    let log_level = or_default("MURMUR_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("MURMUR_DB_MAX_CONNECTIONS", "5")?;
    let db_acquire_timeout_secs = parse_u64("MURMUR_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let harvest_max_items = parse_usize("MURMUR_HARVEST_MAX_ITEMS", "50")?;
    if harvest_max_items == 0 || harvest_max_items > MAX_ITEMS_LIMIT {
        return Err(invalid(
            "MURMUR_HARVEST_MAX_ITEMS",
            format!("must be between 1 and {MAX_ITEMS_LIMIT}, got {harvest_max_items}"),
        ));
    }
    let harvest_stop_timeout_secs = parse_u64("MURMUR_HARVEST_STOP_TIMEOUT_SECS", "5")?;
    let harvest_channel_capacity = parse_usize("MURMUR_HARVEST_CHANNEL_CAPACITY", "256")?;
    if harvest_channel_capacity == 0 {
        return Err(invalid(
            "MURMUR_HARVEST_CHANNEL_CAPACITY",
            "must be at least 1".to_string(),
        ));
    }
    let harvest_request_timeout_secs = parse_u64("MURMUR_HARVEST_REQUEST_TIMEOUT_SECS", "30")?;
    let harvest_inter_request_delay_ms =
        parse_u64("MURMUR_HARVEST_INTER_REQUEST_DELAY_MS", "1000")?;
    let harvest_user_agent = or_default(
        "MURMUR_HARVEST_USER_AGENT",
        "murmur/0.1 (topic-harvester)",
    );
    let replay_path = optional("MURMUR_REPLAY_PATH").map(PathBuf::from);

    let llm_base_url = or_default("MURMUR_LLM_BASE_URL", "https://api.deepseek.com");
    let llm_model = or_default("MURMUR_LLM_MODEL", "deepseek-chat");
    let llm_api_key = optional("MURMUR_LLM_API_KEY");
    let llm_timeout_secs = parse_u64("MURMUR_LLM_TIMEOUT_SECS", "60")?;
    let analysis_concurrency = parse_usize("MURMUR_ANALYSIS_CONCURRENCY", "10")?;
    if analysis_concurrency == 0 {
        return Err(invalid(
            "MURMUR_ANALYSIS_CONCURRENCY",
            "must be at least 1".to_string(),
        ));
    }
    let llm_max_retries = parse_u32("MURMUR_LLM_MAX_RETRIES", "3")?;
    let llm_backoff_base_ms = parse_u64("MURMUR_LLM_BACKOFF_BASE_MS", "1000")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_acquire_timeout_secs,
        harvest_max_items,
        harvest_stop_timeout_secs,
        harvest_channel_capacity,
        harvest_request_timeout_secs,
        harvest_inter_request_delay_ms,
        harvest_user_agent,
        replay_path,
        llm_base_url,
        llm_model,
        llm_api_key,
        llm_timeout_secs,
        analysis_concurrency,
        llm_max_retries,
        llm_backoff_base_ms,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MURMUR_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

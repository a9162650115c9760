use std::collections::HashMap;
use std::env::VarError;

use super::*;

fn lookup_from_map<'a>(
    map: &'a HashMap<&'a str, &'a str>,
) -> impl Fn(&str) -> Result<String, VarError> + 'a {
    move |key| {
        map.get(key)
            .map(|v| (*v).to_string())
            .ok_or(VarError::NotPresent)
    }
}

fn full_env<'a>() -> HashMap<&'a str, &'a str> {
    let mut m = HashMap::new();
    m.insert("DATABASE_URL", "sqlite://tmp/test.db");
    m.insert("MURMUR_LLM_API_KEY", "sk-test");
    m
}

#[test]
fn parse_environment_known_values() {
    assert_eq!(
        parse_environment("development").unwrap(),
        Environment::Development
    );
    assert_eq!(parse_environment("test").unwrap(), Environment::Test);
    assert_eq!(
        parse_environment("production").unwrap(),
        Environment::Production
    );
}

#[test]
fn parse_environment_unknown_fails() {
    let err = parse_environment("staging").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "MURMUR_ENV"));
}

#[test]
fn build_app_config_uses_defaults_for_empty_env() {
    let map: HashMap<&str, &str> = HashMap::new();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.database_url, "sqlite://data/murmur.db");
    assert_eq!(cfg.env, Environment::Development);
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.db_max_connections, 5);
    assert_eq!(cfg.db_acquire_timeout_secs, 10);
    assert_eq!(cfg.harvest_max_items, 50);
    assert_eq!(cfg.harvest_stop_timeout_secs, 5);
    assert_eq!(cfg.harvest_channel_capacity, 256);
    assert_eq!(cfg.harvest_request_timeout_secs, 30);
    assert_eq!(cfg.harvest_inter_request_delay_ms, 1000);
    assert_eq!(cfg.harvest_user_agent, "murmur/0.1 (topic-harvester)");
    assert!(cfg.replay_path.is_none());
    assert_eq!(cfg.llm_base_url, "https://api.deepseek.com");
    assert_eq!(cfg.llm_model, "deepseek-chat");
    assert!(cfg.llm_api_key.is_none());
    assert_eq!(cfg.llm_timeout_secs, 60);
    assert_eq!(cfg.analysis_concurrency, 10);
    assert_eq!(cfg.llm_max_retries, 3);
    assert_eq!(cfg.llm_backoff_base_ms, 1000);
}

#[test]
fn build_app_config_reads_overrides() {
    let mut map = full_env();
    map.insert("MURMUR_ENV", "production");
    map.insert("MURMUR_ANALYSIS_CONCURRENCY", "4");
    map.insert("MURMUR_REPLAY_PATH", "fixtures/replay.jsonl");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert_eq!(cfg.env, Environment::Production);
    assert_eq!(cfg.database_url, "sqlite://tmp/test.db");
    assert_eq!(cfg.analysis_concurrency, 4);
    assert_eq!(cfg.llm_api_key.as_deref(), Some("sk-test"));
    assert_eq!(
        cfg.replay_path,
        Some(std::path::PathBuf::from("fixtures/replay.jsonl"))
    );
}

#[test]
fn blank_api_key_is_treated_as_unset() {
    let mut map = full_env();
    map.insert("MURMUR_LLM_API_KEY", "   ");
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    assert!(cfg.llm_api_key.is_none());
}

#[test]
fn build_app_config_rejects_non_numeric_concurrency() {
    let mut map = full_env();
    map.insert("MURMUR_ANALYSIS_CONCURRENCY", "lots");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "MURMUR_ANALYSIS_CONCURRENCY"),
        "expected InvalidEnvVar(MURMUR_ANALYSIS_CONCURRENCY), got: {result:?}"
    );
}

#[test]
fn build_app_config_rejects_zero_concurrency() {
    let mut map = full_env();
    map.insert("MURMUR_ANALYSIS_CONCURRENCY", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(
        matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "MURMUR_ANALYSIS_CONCURRENCY"),
        "expected InvalidEnvVar(MURMUR_ANALYSIS_CONCURRENCY), got: {result:?}"
    );
}

#[test]
fn build_app_config_rejects_max_items_out_of_range() {
    for bad in ["0", "501"] {
        let mut map = full_env();
        map.insert("MURMUR_HARVEST_MAX_ITEMS", bad);
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "MURMUR_HARVEST_MAX_ITEMS"),
            "expected InvalidEnvVar(MURMUR_HARVEST_MAX_ITEMS) for {bad}, got: {result:?}"
        );
    }
}

#[test]
fn build_app_config_rejects_zero_channel_capacity() {
    let mut map = full_env();
    map.insert("MURMUR_HARVEST_CHANNEL_CAPACITY", "0");
    let result = build_app_config(lookup_from_map(&map));
    assert!(result.is_err(), "expected Err, got: {result:?}");
}

#[test]
fn debug_output_redacts_secrets() {
    let map = full_env();
    let cfg = build_app_config(lookup_from_map(&map)).unwrap();
    let rendered = format!("{cfg:?}");
    assert!(!rendered.contains("sk-test"), "api key leaked: {rendered}");
    assert!(!rendered.contains("tmp/test.db"), "db url leaked: {rendered}");
    assert!(rendered.contains("[redacted]"));
}

//! `analyze` command: classify stored publications and print the reports.

use std::sync::Arc;

use murmur_core::{AppConfig, Source};
use murmur_sentiment::{
    AnalysisSettings, AnalysisState, AnalysisSupervisor, BackoffPolicy, OpenAiCompatClient,
    SentimentClassifier,
};
use sqlx::SqlitePool;

/// Run the analysis supervisor for `topic` and print one block per source.
///
/// With no `sources`, every source that has publications under the topic is
/// analyzed.
///
/// # Errors
///
/// Returns an error if no API key is configured, the concurrency override is
/// zero, or the supervisor rejects the request (conflict or invalid input).
pub(crate) async fn run_analyze(
    pool: &SqlitePool,
    config: &AppConfig,
    topic: &str,
    sources: Vec<Source>,
    concurrency: Option<usize>,
) -> anyhow::Result<()> {
    let sources = if sources.is_empty() {
        murmur_db::count_publications_by_source(pool, topic)
            .await?
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(source, _)| source)
            .collect()
    } else {
        sources
    };
    if sources.is_empty() {
        println!("no publications stored for topic '{topic}'; run `harvest` first");
        return Ok(());
    }

    let Some(client) = OpenAiCompatClient::from_app_config(config)? else {
        anyhow::bail!("MURMUR_LLM_API_KEY is not set; analysis needs a completion API");
    };
    let classifier = Arc::new(SentimentClassifier::new(
        Arc::new(client),
        BackoffPolicy::from_app_config(config),
    ));

    let mut settings = AnalysisSettings::from_app_config(config, "cli");
    if let Some(limit) = concurrency {
        anyhow::ensure!(limit >= 1, "--concurrency must be at least 1");
        settings.concurrency_limit = limit;
    }

    let supervisor = AnalysisSupervisor::new(pool.clone(), Arc::clone(&classifier), settings);
    let interrupt = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling pending retries");
                supervisor.cancel();
            }
        })
    };

    let outcomes = supervisor.run(topic, &sources).await;
    interrupt.abort();
    let outcomes = outcomes?;

    for outcome in &outcomes {
        let run = outcome
            .run_id
            .map(|id| format!(" (run {id})"))
            .unwrap_or_default();
        println!("== {} / '{}': {}{run}", outcome.source, outcome.topic, outcome.state);
        match (&outcome.state, &outcome.report, &outcome.error) {
            (AnalysisState::Failed, _, Some(error)) => println!("error: {error}"),
            (_, Some(report), _) => println!("{}", report.report_text),
            _ => {}
        }
        println!();
    }

    let stats = classifier.stats().snapshot();
    println!(
        "classifier: {} calls, {} rate-limit retries, {} short texts, {} errors",
        stats.calls, stats.rate_limit_retries, stats.short_circuits, stats.errors
    );
    Ok(())
}

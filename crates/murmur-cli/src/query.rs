//! Read-only query handlers.

use murmur_core::Source;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Print the latest stored report for `source`, optionally within `topic`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub(crate) async fn run_report(
    pool: &SqlitePool,
    source: Source,
    topic: Option<&str>,
) -> anyhow::Result<()> {
    let Some(report) = murmur_db::latest_report(pool, source, topic).await? else {
        println!(
            "no report found for {source}{}; run `analyze` first",
            topic.map(|t| format!(" and topic '{t}'")).unwrap_or_default()
        );
        return Ok(());
    };

    println!(
        "report #{} for {} / '{}' ({})",
        report.id,
        report.source,
        report.topic,
        report.created_at.format("%Y-%m-%d %H:%M")
    );
    println!("{}", report.report_text);
    Ok(())
}

/// Print the cross-source summary for `topic`.
///
/// # Errors
///
/// Returns an error if a lookup fails or a stored analysis cannot be decoded.
pub(crate) async fn run_summary(pool: &SqlitePool, topic: &str) -> anyhow::Result<()> {
    let summary = murmur_sentiment::topic_summary(pool, topic).await?;
    println!("{summary}");
    Ok(())
}

/// List recent runs, or show one run in detail when `id` is given.
///
/// # Errors
///
/// Returns an error if the query fails or `id` does not exist.
pub(crate) async fn run_runs(pool: &SqlitePool, limit: i64, id: Option<Uuid>) -> anyhow::Result<()> {
    if let Some(id) = id {
        let run = murmur_db::get_run(pool, id)
            .await
            .map_err(|e| anyhow::anyhow!("run {id}: {e}"))?;
        println!("id:        {}", run.public_id);
        println!("type:      {}", run.run_type);
        println!("trigger:   {}", run.trigger_source);
        println!("topic:     {}", run.topic);
        println!("status:    {}", run.status);
        println!("created:   {}", run.created_at.to_rfc3339());
        if let Some(started) = run.started_at {
            println!("started:   {}", started.to_rfc3339());
        }
        if let Some(completed) = run.completed_at {
            println!("completed: {}", completed.to_rfc3339());
        }
        println!("records:   {}", run.records_processed);
        if let Some(error) = &run.error_message {
            println!("error:     {error}");
        }
        return Ok(());
    }

    let runs = murmur_db::list_recent_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no runs recorded yet");
        return Ok(());
    }

    println!(
        "{:<38}{:<10}{:<11}{:<18}{:<9}TOPIC",
        "ID", "TYPE", "STATUS", "CREATED", "RECORDS"
    );
    for run in &runs {
        println!(
            "{:<38}{:<10}{:<11}{:<18}{:<9}{}",
            run.public_id.to_string(),
            run.run_type,
            run.status,
            run.created_at.format("%Y-%m-%d %H:%M").to_string(),
            run.records_processed,
            run.topic
        );
    }
    Ok(())
}

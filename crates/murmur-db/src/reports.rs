//! Database operations for the `reports` table.

use chrono::{DateTime, Utc};
use murmur_core::{Report, Source};
use sqlx::SqlitePool;

use crate::analyses::insert_analysis;
use crate::DbError;

/// A row from the `reports` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub source: String,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub report_text: String,
    pub model: String,
    pub concurrency_limit: i64,
}

/// Store a report and its structured analyses atomically.
///
/// Returns the new report id.
///
/// # Errors
///
/// Returns [`DbError::Json`] if the analyses cannot be serialized, or
/// [`DbError::Sqlx`] if either insert fails (nothing is written in that case).
pub async fn persist_report(pool: &SqlitePool, report: &Report) -> Result<i64, DbError> {
    let content_json = serde_json::to_string(&report.analyses)?;
    let concurrency_limit = i64::try_from(report.concurrency_limit)
        .map_err(|_| DbError::InvalidStoredValue("concurrency limit overflows i64".to_string()))?;

    let mut tx = pool.begin().await?;

    let report_id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO reports (source, topic, created_at, report_text, model, concurrency_limit) \
         VALUES (?, ?, ?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(report.source.as_str())
    .bind(&report.topic)
    .bind(report.created_at)
    .bind(&report.report_text)
    .bind(&report.model)
    .bind(concurrency_limit)
    .fetch_one(&mut *tx)
    .await?;

    insert_analysis(
        &mut tx,
        report.source,
        &report.topic,
        report.created_at,
        &content_json,
    )
    .await?;

    tx.commit().await?;
    Ok(report_id)
}

/// Fetch the most recent report for `source`, optionally narrowed to `topic`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_report(
    pool: &SqlitePool,
    source: Source,
    topic: Option<&str>,
) -> Result<Option<ReportRow>, DbError> {
    let row = sqlx::query_as::<_, ReportRow>(
        "SELECT id, source, topic, created_at, report_text, model, concurrency_limit \
         FROM reports \
         WHERE source = ? AND (? IS NULL OR topic = ?) \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(source.as_str())
    .bind(topic)
    .bind(topic)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

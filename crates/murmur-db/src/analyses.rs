//! Database operations for the `analyses` table.

use chrono::{DateTime, Utc};
use murmur_core::{PublicationAnalysis, Source};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::publications::parse_source;
use crate::DbError;

/// A row from the `analyses` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRow {
    pub id: i64,
    pub source: String,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub content_json: String,
}

/// An analyses row with its JSON payload decoded.
#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub id: i64,
    pub source: Source,
    pub topic: String,
    pub created_at: DateTime<Utc>,
    pub analyses: Vec<PublicationAnalysis>,
}

impl TryFrom<AnalysisRow> for StoredAnalysis {
    type Error = DbError;

    fn try_from(row: AnalysisRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            source: parse_source(&row.source)?,
            topic: row.topic,
            created_at: row.created_at,
            analyses: serde_json::from_str(&row.content_json)?,
        })
    }
}

pub(crate) async fn insert_analysis(
    tx: &mut Transaction<'_, Sqlite>,
    source: Source,
    topic: &str,
    created_at: DateTime<Utc>,
    content_json: &str,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO analyses (source, topic, created_at, content_json) \
         VALUES (?, ?, ?, ?) \
         RETURNING id",
    )
    .bind(source.as_str())
    .bind(topic)
    .bind(created_at)
    .bind(content_json)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Fetch and decode the most recent analyses for `(source, topic)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails or [`DbError::Json`] if the
/// stored payload cannot be decoded.
pub async fn latest_analysis(
    pool: &SqlitePool,
    source: Source,
    topic: &str,
) -> Result<Option<StoredAnalysis>, DbError> {
    let row = sqlx::query_as::<_, AnalysisRow>(
        "SELECT id, source, topic, created_at, content_json \
         FROM analyses \
         WHERE source = ? AND topic = ? \
         ORDER BY created_at DESC, id DESC \
         LIMIT 1",
    )
    .bind(source.as_str())
    .bind(topic)
    .fetch_optional(pool)
    .await?;

    row.map(StoredAnalysis::try_from).transpose()
}

//! Database operations for the `publications` table.

use chrono::{DateTime, Utc};
use murmur_core::{Publication, Source};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `publications` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PublicationRow {
    pub source: String,
    pub topic: String,
    pub publication_id: String,
    pub requested_at: DateTime<Utc>,
    pub published_at: String,
    pub raw_text: String,
    pub run_id: Option<Uuid>,
    pub ingested_at: DateTime<Utc>,
}

impl PublicationRow {
    /// Convert into the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidStoredValue`] if the stored source key is unknown.
    pub fn into_publication(self) -> Result<Publication, DbError> {
        let source = parse_source(&self.source)?;
        Ok(Publication {
            id: self.publication_id,
            source,
            topic: self.topic,
            requested_at: self.requested_at,
            published_at: self.published_at,
            raw_text: self.raw_text,
        })
    }
}

/// Whether an insert produced a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Insert a publication unless `(source, topic, id)` already exists.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_publication(
    pool: &SqlitePool,
    publication: &Publication,
    run_id: Option<Uuid>,
) -> Result<InsertOutcome, DbError> {
    let result = sqlx::query(
        "INSERT INTO publications \
             (source, topic, publication_id, requested_at, published_at, raw_text, run_id, ingested_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (source, topic, publication_id) DO NOTHING",
    )
    .bind(publication.source.as_str())
    .bind(&publication.topic)
    .bind(&publication.id)
    .bind(publication.requested_at)
    .bind(&publication.published_at)
    .bind(&publication.raw_text)
    .bind(run_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(if result.rows_affected() == 0 {
        InsertOutcome::Duplicate
    } else {
        InsertOutcome::Inserted
    })
}

/// List every publication stored for `(source, topic)` in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_publications(
    pool: &SqlitePool,
    source: Source,
    topic: &str,
) -> Result<Vec<Publication>, DbError> {
    let rows = sqlx::query_as::<_, PublicationRow>(
        "SELECT source, topic, publication_id, requested_at, published_at, raw_text, \
                run_id, ingested_at \
         FROM publications \
         WHERE source = ? AND topic = ? \
         ORDER BY rowid",
    )
    .bind(source.as_str())
    .bind(topic)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PublicationRow::into_publication).collect()
}

/// Count publications stored under `topic`, grouped by source.
///
/// Sources with no publications are omitted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::InvalidStoredValue`] for an unknown source key.
pub async fn count_publications_by_source(
    pool: &SqlitePool,
    topic: &str,
) -> Result<Vec<(Source, i64)>, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT source, COUNT(*) FROM publications \
         WHERE topic = ? \
         GROUP BY source \
         ORDER BY source",
    )
    .bind(topic)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(source, count)| Ok((parse_source(&source)?, count)))
        .collect()
}

pub(crate) fn parse_source(raw: &str) -> Result<Source, DbError> {
    raw.parse::<Source>()
        .map_err(|e| DbError::InvalidStoredValue(e.to_string()))
}

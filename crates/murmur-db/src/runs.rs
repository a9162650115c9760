//! Database operations for the `runs` ledger.
//!
//! Status moves `queued -> running -> succeeded | failed`. Every transition
//! is guarded in the `WHERE` clause, so an out-of-order update affects no rows
//! and surfaces as [`DbError::InvalidRunTransition`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunType {
    Harvest,
    Analysis,
}

impl RunType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunType::Harvest => "harvest",
            RunType::Analysis => "analysis",
        }
    }
}

/// A row from the `runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub topic: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, topic, status, \
                           started_at, completed_at, records_processed, error_message, created_at";

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Creates a new run in `queued` status and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_run(
    pool: &SqlitePool,
    run_type: RunType,
    trigger_source: &str,
    topic: &str,
) -> Result<RunRow, DbError> {
    let public_id = Uuid::new_v4();

    let row = sqlx::query_as::<_, RunRow>(&format!(
        "INSERT INTO runs (public_id, run_type, trigger_source, topic, status, created_at) \
         VALUES (?, ?, ?, ?, 'queued', ?) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(public_id)
    .bind(run_type.as_str())
    .bind(trigger_source)
    .bind(topic)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a `queued` run as `running`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not queued.
pub async fn start_run(pool: &SqlitePool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs SET status = 'running', started_at = ? \
         WHERE id = ? AND status = 'queued'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "queued",
        });
    }
    Ok(())
}

/// Marks a `running` run as `succeeded` with its processed count.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not running.
pub async fn complete_run(
    pool: &SqlitePool,
    id: i64,
    records_processed: i64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs SET status = 'succeeded', completed_at = ?, records_processed = ? \
         WHERE id = ? AND status = 'running'",
    )
    .bind(Utc::now())
    .bind(records_processed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }
    Ok(())
}

/// Marks a `queued` or `running` run as `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run already finished.
pub async fn fail_run(pool: &SqlitePool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE runs SET status = 'failed', completed_at = ?, error_message = ? \
         WHERE id = ? AND status IN ('queued', 'running')",
    )
    .bind(Utc::now())
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "queued or running",
        });
    }
    Ok(())
}

/// Fetch a run by its public id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has that id.
pub async fn get_run(pool: &SqlitePool, public_id: Uuid) -> Result<RunRow, DbError> {
    sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE public_id = ?"
    ))
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Most recent runs first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<RunRow>, DbError> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC, id DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

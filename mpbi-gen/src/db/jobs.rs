//! Generation job persistence
//!
//! One row per job in `generation_jobs`. The queue and error list are stored
//! as JSON text; the whole row is rewritten after every batch.

use chrono::{DateTime, SecondsFormat, Utc};
use mpbi_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::GenerationJob;

fn timestamp(dt: DateTime<Utc>) -> String {
    // Fixed-width UTC text so string comparison orders correctly
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Insert or overwrite a job row
pub async fn save_job(pool: &SqlitePool, job: &GenerationJob) -> Result<()> {
    let errors = serde_json::to_string(&job.errors)
        .map_err(|e| Error::Internal(format!("Failed to serialize errors: {}", e)))?;
    let queue = serde_json::to_string(&job.remaining_queue)
        .map_err(|e| Error::Internal(format!("Failed to serialize queue: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO generation_jobs (
            job_id, total, processed, successful, errors,
            remaining_queue, packaging_requested, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(job_id) DO UPDATE SET
            processed = excluded.processed,
            successful = excluded.successful,
            errors = excluded.errors,
            remaining_queue = excluded.remaining_queue,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(job.total as i64)
    .bind(job.processed as i64)
    .bind(job.successful as i64)
    .bind(errors)
    .bind(queue)
    .bind(job.packaging_requested as i64)
    .bind(timestamp(job.created_at))
    .bind(timestamp(job.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by id
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<GenerationJob>> {
    let row = sqlx::query(
        r#"
        SELECT job_id, total, processed, successful, errors,
               remaining_queue, packaging_requested, created_at, updated_at
        FROM generation_jobs
        WHERE job_id = ?
        "#,
    )
    .bind(job_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let errors: String = row.get("errors");
    let errors: Vec<String> = serde_json::from_str(&errors)
        .map_err(|e| Error::Internal(format!("Failed to deserialize errors: {}", e)))?;

    let queue: String = row.get("remaining_queue");
    let remaining_queue: VecDeque<i64> = serde_json::from_str(&queue)
        .map_err(|e| Error::Internal(format!("Failed to deserialize queue: {}", e)))?;

    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Some(GenerationJob {
        job_id,
        total: row.get::<i64, _>("total") as usize,
        processed: row.get::<i64, _>("processed") as usize,
        successful: row.get::<i64, _>("successful") as usize,
        errors,
        remaining_queue,
        packaging_requested: row.get::<i64, _>("packaging_requested") != 0,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    }))
}

/// Delete a job. Returns whether a row existed.
pub async fn delete_job(pool: &SqlitePool, job_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM generation_jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every job created more than `staleness_secs` before `now`,
/// finished or not. Returns the number of evicted jobs.
pub async fn evict_stale_jobs(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    staleness_secs: u64,
) -> Result<u64> {
    let cutoff = now - chrono::Duration::seconds(staleness_secs as i64);
    let result = sqlx::query("DELETE FROM generation_jobs WHERE created_at < ?")
        .bind(timestamp(cutoff))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_jobs(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generation_jobs")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

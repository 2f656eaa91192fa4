//! Database operations for `generation_jobs` and `generation_job_items`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `generation_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenerationJobRow {
    pub id: Uuid,
    pub store_id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    /// Map of field type → enabled flag, as submitted by the client.
    pub content_fields: Value,
    /// The `GenerationSettings` object the batch was started with.
    pub settings: Value,
    pub total_items: i32,
    pub processed_items: i32,
    pub successful_items: i32,
    pub failed_items: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `generation_job_items` table — one per product in a batch.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GenerationJobItemRow {
    pub id: Uuid,
    pub job_id: Uuid,
    pub product_id: Uuid,
    pub status: String,
    /// Truncated to 500 characters by the orchestrator before persisting.
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

const JOB_COLUMNS: &str = "id, store_id, owner_id, status, content_fields, settings, \
     total_items, processed_items, successful_items, failed_items, \
     error_message, started_at, completed_at, created_at";

// ---------------------------------------------------------------------------
// generation_jobs operations
// ---------------------------------------------------------------------------

/// Creates a new generation job in `pending` status and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_generation_job(
    pool: &PgPool,
    store_id: Uuid,
    owner_id: Uuid,
    content_fields: &Value,
    settings: &Value,
    total_items: i32,
) -> Result<GenerationJobRow, DbError> {
    let row = sqlx::query_as::<_, GenerationJobRow>(&format!(
        "INSERT INTO generation_jobs \
             (store_id, owner_id, status, content_fields, settings, total_items) \
         VALUES ($1, $2, 'pending', $3, $4, $5) \
         RETURNING {JOB_COLUMNS}"
    ))
    .bind(store_id)
    .bind(owner_id)
    .bind(content_fields)
    .bind(settings)
    .bind(total_items)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Creates one `pending` item row per product, in input order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a duplicate
/// product within the same job, which violates the unique constraint).
pub async fn create_job_items(
    pool: &PgPool,
    job_id: Uuid,
    product_ids: &[Uuid],
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO generation_job_items (job_id, product_id, status) \
         SELECT $1, unnest($2::uuid[]), 'pending'",
    )
    .bind(job_id)
    .bind(product_ids)
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks a job as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `pending`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn start_generation_job(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_jobs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Persists the per-product progress counters after an item finishes.
///
/// The caller maintains `processed = successful + failed`; this function just
/// writes what it is given.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the job does not exist, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_job_progress(
    pool: &PgPool,
    id: Uuid,
    processed: i32,
    successful: i32,
    failed: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_jobs \
         SET processed_items = $1, successful_items = $2, failed_items = $3 \
         WHERE id = $4",
    )
    .bind(processed)
    .bind(successful)
    .bind(failed)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Marks a running job with its terminal status and sets `completed_at`.
///
/// `status` is `completed` or `failed`; the orchestrator computes it from the
/// success/failure counters after the loop.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_generation_job(
    pool: &PgPool,
    id: Uuid,
    status: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_jobs \
         SET status = $1, completed_at = NOW() \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(status)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a job as `failed` with an error message, from either `pending` or
/// `running` (fatal errors can strike before the first product starts).
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job already reached a
/// terminal status, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_generation_job(
    pool: &PgPool,
    id: Uuid,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_jobs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status IN ('pending', 'running')",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending or running",
        });
    }

    Ok(())
}

/// Fetches a single job by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_generation_job(pool: &PgPool, id: Uuid) -> Result<GenerationJobRow, DbError> {
    let row = sqlx::query_as::<_, GenerationJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM generation_jobs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recent `limit` jobs for a store, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_generation_jobs(
    pool: &PgPool,
    store_id: Uuid,
    limit: i64,
) -> Result<Vec<GenerationJobRow>, DbError> {
    let rows = sqlx::query_as::<_, GenerationJobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM generation_jobs \
         WHERE store_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(store_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

// ---------------------------------------------------------------------------
// generation_job_items operations
// ---------------------------------------------------------------------------

/// Returns all item rows for a job, in creation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_items(
    pool: &PgPool,
    job_id: Uuid,
) -> Result<Vec<GenerationJobItemRow>, DbError> {
    let rows = sqlx::query_as::<_, GenerationJobItemRow>(
        "SELECT id, job_id, product_id, status, error_message, created_at \
         FROM generation_job_items \
         WHERE job_id = $1 \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Marks a `pending` item as `processing`.
///
/// # Errors
///
/// Returns [`DbError::InvalidItemTransition`] if the item is not `pending`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn mark_item_processing(
    pool: &PgPool,
    job_id: Uuid,
    product_id: Uuid,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_job_items \
         SET status = 'processing' \
         WHERE job_id = $1 AND product_id = $2 AND status = 'pending'",
    )
    .bind(job_id)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidItemTransition { product_id });
    }

    Ok(())
}

/// Marks a `processing` item as `completed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidItemTransition`] if the item is not
/// `processing`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_job_item(
    pool: &PgPool,
    job_id: Uuid,
    product_id: Uuid,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_job_items \
         SET status = 'completed', error_message = NULL \
         WHERE job_id = $1 AND product_id = $2 AND status = 'processing'",
    )
    .bind(job_id)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidItemTransition { product_id });
    }

    Ok(())
}

/// Marks an item as `failed` with a truncated error message.
///
/// Accepts items in `pending` or `processing`; a product that fails before
/// its item was marked processing still gets a failure record.
///
/// # Errors
///
/// Returns [`DbError::InvalidItemTransition`] if the item already reached a
/// terminal status, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_job_item(
    pool: &PgPool,
    job_id: Uuid,
    product_id: Uuid,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE generation_job_items \
         SET status = 'failed', error_message = $1 \
         WHERE job_id = $2 AND product_id = $3 AND status IN ('pending', 'processing')",
    )
    .bind(error_message)
    .bind(job_id)
    .bind(product_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidItemTransition { product_id });
    }

    Ok(())
}

/// Fails jobs stranded in `running` longer than `older_than_secs`, along with
/// their unfinished items. Returns the ids of the jobs that were reaped.
///
/// A client that disconnects mid-stream stops the orchestrator without a
/// terminal status write; the scheduler calls this periodically to clean up.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either update fails.
pub async fn fail_stale_jobs(pool: &PgPool, older_than_secs: i64) -> Result<Vec<Uuid>, DbError> {
    let reaped: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE generation_jobs \
         SET status = 'failed', completed_at = NOW(), \
             error_message = 'job exceeded the maximum run time and was reaped' \
         WHERE status = 'running' \
           AND started_at < NOW() - make_interval(secs => $1::double precision) \
         RETURNING id",
    )
    .bind(older_than_secs)
    .fetch_all(pool)
    .await?;

    if !reaped.is_empty() {
        sqlx::query(
            "UPDATE generation_job_items \
             SET status = 'failed', error_message = 'job was reaped before this item finished' \
             WHERE job_id = ANY($1) AND status IN ('pending', 'processing')",
        )
        .bind(&reaped)
        .execute(pool)
        .await?;
    }

    Ok(reaped)
}

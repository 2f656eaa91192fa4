//! The orchestrator's persistence interface.
//!
//! `run_batch` talks to storage through [`GenerationStore`] rather than a
//! pool directly, mirroring the injected event sink: the server and CLI wire
//! in [`PgStore`], tests an in-memory implementation.

use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use flowz_core::{ItemStatus, JobStatus};
use flowz_db::{DbError, ProductRow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    /// For store implementations not backed by `flowz-db`.
    #[error("store error: {0}")]
    Other(String),
}

/// Job/item/product bookkeeping needed by one batch run.
///
/// Every method maps to a single independent write or read; no transactions
/// span them. Concurrent batches over the same store race on the draft merge
/// (last write wins) — an accepted limitation.
#[allow(async_fn_in_trait)]
pub trait GenerationStore: Send + Sync {
    /// Transitions the job `pending → running`.
    async fn mark_job_running(&self, job_id: Uuid) -> Result<(), StoreError>;

    /// Fetches a product scoped to the batch's store; `None` covers both
    /// missing and foreign products.
    async fn fetch_product(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ProductRow>, StoreError>;

    /// Persists a product's merged draft content.
    async fn save_draft(&self, product_id: Uuid, draft_content: &Value) -> Result<(), StoreError>;

    /// Advances an item's status. `error` accompanies [`ItemStatus::Failed`]
    /// and is already truncated by the orchestrator.
    async fn update_item(
        &self,
        job_id: Uuid,
        product_id: Uuid,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Persists job counters after a product finishes, success or failure.
    async fn update_progress(
        &self,
        job_id: Uuid,
        processed: i32,
        successful: i32,
        failed: i32,
    ) -> Result<(), StoreError>;

    /// Writes the terminal status (`completed` or `failed`) exactly once.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// Postgres-backed store delegating to the `flowz-db` query functions.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl GenerationStore for PgStore {
    async fn mark_job_running(&self, job_id: Uuid) -> Result<(), StoreError> {
        flowz_db::start_generation_job(&self.pool, job_id).await?;
        Ok(())
    }

    async fn fetch_product(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ProductRow>, StoreError> {
        Ok(flowz_db::get_product(&self.pool, store_id, product_id).await?)
    }

    async fn save_draft(&self, product_id: Uuid, draft_content: &Value) -> Result<(), StoreError> {
        flowz_db::update_draft_content(&self.pool, product_id, draft_content).await?;
        Ok(())
    }

    async fn update_item(
        &self,
        job_id: Uuid,
        product_id: Uuid,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        match status {
            ItemStatus::Processing => {
                flowz_db::mark_item_processing(&self.pool, job_id, product_id).await?;
            }
            ItemStatus::Completed => {
                flowz_db::complete_job_item(&self.pool, job_id, product_id).await?;
            }
            ItemStatus::Failed => {
                flowz_db::fail_job_item(&self.pool, job_id, product_id, error.unwrap_or(""))
                    .await?;
            }
            ItemStatus::Pending => {
                // Items are created pending; nothing ever moves one back.
            }
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        job_id: Uuid,
        processed: i32,
        successful: i32,
        failed: i32,
    ) -> Result<(), StoreError> {
        flowz_db::update_job_progress(&self.pool, job_id, processed, successful, failed).await?;
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        match (status, error) {
            (JobStatus::Failed, Some(message)) => {
                flowz_db::fail_generation_job(&self.pool, job_id, message).await?;
            }
            _ => {
                flowz_db::complete_generation_job(&self.pool, job_id, status.as_str()).await?;
            }
        }
        Ok(())
    }
}

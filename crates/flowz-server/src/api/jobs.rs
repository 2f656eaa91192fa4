//! Read endpoints for generation job history, backing the dashboard's batch
//! progress page.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use flowz_db::{GenerationJobItemRow, GenerationJobRow};

use crate::middleware::{AuthUser, RequestId};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct JobsQuery {
    pub store_id: Uuid,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobSummary {
    job_id: Uuid,
    store_id: Uuid,
    status: String,
    content_fields: Value,
    total_items: i32,
    processed_items: i32,
    successful_items: i32,
    failed_items: i32,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobDetail {
    #[serde(flatten)]
    summary: JobSummary,
    settings: Value,
    items: Vec<JobItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct JobItem {
    product_id: Uuid,
    status: String,
    error_message: Option<String>,
}

impl JobSummary {
    fn from_row(row: GenerationJobRow) -> Self {
        Self {
            job_id: row.id,
            store_id: row.store_id,
            status: row.status,
            content_fields: row.content_fields,
            total_items: row.total_items,
            processed_items: row.processed_items,
            successful_items: row.successful_items,
            failed_items: row.failed_items,
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
        }
    }
}

impl JobItem {
    fn from_row(row: GenerationJobItemRow) -> Self {
        Self {
            product_id: row.product_id,
            status: row.status,
            error_message: row.error_message,
        }
    }
}

/// `GET /api/v1/jobs?store_id=&limit=` — recent jobs for an owned store.
pub(super) async fn list_jobs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<ApiResponse<Vec<JobSummary>>>, ApiError> {
    let store = flowz_db::get_store(&state.pool, query.store_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| store_forbidden(&req_id))?;

    if let Some(user_id) = auth_user.0 {
        if store.owner_id != user_id {
            return Err(store_forbidden(&req_id));
        }
    }

    let rows = flowz_db::list_generation_jobs(&state.pool, store.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(JobSummary::from_row).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// `GET /api/v1/jobs/{job_id}` — one job with its per-product items.
pub(super) async fn get_job(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(auth_user): Extension<AuthUser>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobDetail>>, ApiError> {
    let row = match flowz_db::get_generation_job(&state.pool, job_id).await {
        Ok(row) => row,
        Err(flowz_db::DbError::NotFound) => {
            return Err(ApiError::new(req_id.0, "not_found", "no such job"));
        }
        Err(e) => return Err(map_db_error(req_id.0, &e)),
    };

    if let Some(user_id) = auth_user.0 {
        if row.owner_id != user_id {
            // Hide foreign jobs entirely rather than acknowledging them.
            return Err(ApiError::new(req_id.0, "not_found", "no such job"));
        }
    }

    let items = flowz_db::list_job_items(&state.pool, row.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let settings = row.settings.clone();
    Ok(Json(ApiResponse {
        data: JobDetail {
            summary: JobSummary::from_row(row),
            settings,
            items: items.into_iter().map(JobItem::from_row).collect(),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

fn store_forbidden(req_id: &RequestId) -> ApiError {
    ApiError::new(
        req_id.0.clone(),
        "forbidden",
        "store not found or not owned by caller",
    )
}

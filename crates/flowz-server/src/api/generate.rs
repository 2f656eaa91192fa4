//! The batch-generation endpoint: validates, books the job, then answers
//! with a server-sent-event stream fed by the orchestrator.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Extension, Json,
};
use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use flowz_core::{enabled_fields, AppConfig, FieldType, GenerationSettings, JobStatus};
use flowz_gemini::GeminiClient;
use flowz_generate::{
    run_batch, BatchEvent, BatchRequest, EventSink, GenerationStore, ImageFetcher, PgStore,
    SinkClosed,
};

use crate::middleware::{AuthUser, RequestId};

use super::{map_db_error, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct BatchGenerateBody {
    store_id: Uuid,
    product_ids: Vec<Uuid>,
    content_types: HashMap<FieldType, bool>,
    #[serde(default)]
    settings: GenerationSettings,
}

/// `POST /api/v1/generate/batch`
///
/// Non-stream failures: 400 for malformed or invalid bodies, 403 when the
/// store is missing or foreign, 500 when credentials are absent or the job
/// rows cannot be created. Otherwise answers `200 text/event-stream` and the
/// orchestrator takes over in a background task.
pub(super) async fn generate_batch(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(auth_user): Extension<AuthUser>,
    payload: Result<Json<BatchGenerateBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        ApiError::new(req_id.0.clone(), "validation_error", rejection.body_text())
    })?;

    if body.product_ids.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "product_ids must not be empty",
        ));
    }

    let fields = enabled_fields(&body.content_types);
    if fields.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "at least one content type must be enabled",
        ));
    }

    let store = flowz_db::get_store(&state.pool, body.store_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| forbidden(&req_id))?;

    if let Some(user_id) = auth_user.0 {
        if store.owner_id != user_id {
            return Err(forbidden(&req_id));
        }
    }

    let Some(gemini) = state.gemini.clone() else {
        tracing::error!("batch generation requested but GEMINI_API_KEY is not configured");
        return Err(ApiError::new(
            req_id.0,
            "internal_error",
            "generation API credentials are not configured",
        ));
    };

    let owner_id = auth_user.0.unwrap_or(store.owner_id);
    let content_fields = serde_json::to_value(&body.content_types)
        .map_err(|e| internal(&req_id, "could not encode content fields", &e))?;
    let settings_value = serde_json::to_value(&body.settings)
        .map_err(|e| internal(&req_id, "could not encode settings", &e))?;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let total_items = body.product_ids.len() as i32;

    let job = flowz_db::create_generation_job(
        &state.pool,
        store.id,
        owner_id,
        &content_fields,
        &settings_value,
        total_items,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if let Err(e) = flowz_db::create_job_items(&state.pool, job.id, &body.product_ids).await {
        // Leave the job row behind as failed rather than orphaned pending.
        if let Err(mark) =
            flowz_db::fail_generation_job(&state.pool, job.id, "could not create job items").await
        {
            tracing::warn!(job_id = %job.id, error = %mark, "could not mark stillborn job failed");
        }
        return Err(map_db_error(req_id.0, &e));
    }

    tracing::info!(
        job_id = %job.id,
        store_id = %store.id,
        products = body.product_ids.len(),
        fields = fields.len(),
        "starting batch generation job"
    );

    let (tx, rx) = mpsc::unbounded_channel::<BatchEvent>();
    let sink = Arc::new(ChannelSink::new(tx));

    let request = BatchRequest {
        job_id: job.id,
        store_id: store.id,
        product_ids: body.product_ids,
        fields,
        settings: body.settings,
    };

    tokio::spawn(drive_batch(
        state.pool.clone(),
        Arc::clone(&state.config),
        gemini,
        sink,
        request,
    ));

    let stream = UnboundedReceiverStream::new(rx)
        .filter_map(|event| serde_json::to_string(&event).ok())
        .map(|json| Ok::<_, Infallible>(Event::default().data(json)));

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            // Tell nginx-style proxies not to buffer the stream.
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    )
        .into_response())
}

fn forbidden(req_id: &RequestId) -> ApiError {
    ApiError::new(
        req_id.0.clone(),
        "forbidden",
        "store not found or not owned by caller",
    )
}

fn internal(req_id: &RequestId, message: &str, error: &dyn std::fmt::Display) -> ApiError {
    tracing::error!(error = %error, "{message}");
    ApiError::new(req_id.0.clone(), "internal_error", message)
}

/// Runs the orchestrator plus its heartbeat, then tears both down. The SSE
/// stream ends when the last sender clone drops, so cleanup is a matter of
/// letting everything fall out of scope after the heartbeat is aborted.
async fn drive_batch(
    pool: PgPool,
    config: Arc<AppConfig>,
    gemini: Arc<GeminiClient>,
    sink: Arc<ChannelSink>,
    request: BatchRequest,
) {
    let fetcher = match ImageFetcher::new(
        config.image_fetch_timeout_secs,
        config.image_fetch_max_bytes,
    ) {
        Ok(f) => f,
        Err(e) => {
            let message = format!("could not build image fetcher: {e}");
            tracing::error!(job_id = %request.job_id, error = %e, "batch setup failed");
            let store = PgStore::new(pool);
            if let Err(mark) = store
                .finish_job(request.job_id, JobStatus::Failed, Some(&message))
                .await
            {
                tracing::warn!(job_id = %request.job_id, error = %mark, "could not mark job failed");
            }
            let _ = sink.emit(&BatchEvent::Error { error: message });
            return;
        }
    };

    let heartbeat_sink = Arc::clone(&sink);
    let interval = Duration::from_secs(config.heartbeat_interval_secs.max(1));
    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; the connected event covers that.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if heartbeat_sink.emit(&BatchEvent::Heartbeat).is_err() {
                break;
            }
        }
    });

    let store = PgStore::new(pool);
    let result = run_batch(&store, &gemini, &fetcher, sink.as_ref(), &request).await;

    // Always stop the heartbeat before the sink drops, whatever happened.
    heartbeat.abort();

    match result {
        Ok(summary) => {
            tracing::info!(
                job_id = %request.job_id,
                successful = summary.successful,
                failed = summary.failed,
                status = %summary.status,
                cancelled = summary.cancelled,
                "batch generation job finished"
            );
        }
        Err(e) => {
            tracing::error!(job_id = %request.job_id, error = %e, "batch generation job died");
        }
    }
}

/// Event sink backed by the SSE channel. A send failure means the client went
/// away; the flag suppresses further sends and the orchestrator stops at its
/// next checkpoint.
struct ChannelSink {
    tx: mpsc::UnboundedSender<BatchEvent>,
    closed: AtomicBool,
}

impl ChannelSink {
    fn new(tx: mpsc::UnboundedSender<BatchEvent>) -> Self {
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: &BatchEvent) -> Result<(), SinkClosed> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SinkClosed);
        }
        if self.tx.send(event.clone()).is_err() {
            self.closed.store(true, Ordering::Relaxed);
            return Err(SinkClosed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.tx.is_closed()
    }
}

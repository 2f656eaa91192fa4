//! The sequential batch-generation loop.
//!
//! One invocation drives one job: products in order, and within a product the
//! enabled fields in their fixed order. Individual generation calls retry
//! inside the Gemini client; a product that still fails is recorded and the
//! loop advances. Only errors outside the per-product handling (job state
//! transitions, counter writes) are fatal to the batch.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use flowz_core::{FieldType, GenerationSettings, ItemStatus, JobStatus};
use flowz_db::ProductRow;
use flowz_gemini::{GeminiClient, GeminiError};

use crate::context::ProductContext;
use crate::draft::{FieldDraft, ImageAlt};
use crate::events::{preview, truncate_chars, BatchEvent, EventSink};
use crate::image_fetch::ImageFetcher;
use crate::prompt::{alt_text_prompt, clean_generated, field_prompt};
use crate::store::{GenerationStore, StoreError};

/// Longest item error message persisted to the store.
const ERROR_MESSAGE_MAX_CHARS: usize = 500;

/// Everything a batch run needs, assembled by the caller after validation.
/// The job row and its item rows already exist in `pending` status.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub job_id: Uuid,
    pub store_id: Uuid,
    pub product_ids: Vec<Uuid>,
    /// Enabled fields in processing order (see [`FieldType::ORDERED`]).
    pub fields: Vec<FieldType>,
    pub settings: GenerationSettings,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub status: JobStatus,
    /// `true` when the consumer disconnected and the loop stopped early; the
    /// job is left `running` for the stale-job reaper.
    pub cancelled: bool,
}

/// Fatal batch errors — anything escaping the per-product handling.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single product failed. The display string (truncated to 500 chars)
/// is what lands on the item row and in the `product_error` event.
#[derive(Debug, Error)]
enum ProductFailure {
    #[error("product not found in store")]
    NotFound,
    #[error(transparent)]
    Generation(#[from] GeminiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum ProductOutcome {
    Completed,
    /// The sink closed mid-product; no further calls or writes were issued.
    Cancelled,
}

/// Runs a batch to completion, streaming progress into `sink`.
///
/// Emits `connected` first, then per-product event sequences, then exactly
/// one `batch_complete` — or a fatal `error` event if the run dies outside
/// the per-product handling, in which case the job is marked failed and the
/// underlying error is also returned to the caller.
///
/// # Errors
///
/// Returns [`GenerateError`] for fatal store failures (job transitions,
/// counter writes). Per-product failures are not errors.
pub async fn run_batch<S, E>(
    store: &S,
    client: &GeminiClient,
    fetcher: &ImageFetcher,
    sink: &E,
    request: &BatchRequest,
) -> Result<BatchSummary, GenerateError>
where
    S: GenerationStore,
    E: EventSink,
{
    match run_batch_inner(store, client, fetcher, sink, request).await {
        Ok(summary) => Ok(summary),
        Err(err) => {
            let message = err.to_string();
            tracing::error!(job_id = %request.job_id, error = %message, "batch run failed fatally");
            if let Err(e) = store
                .finish_job(request.job_id, JobStatus::Failed, Some(&message))
                .await
            {
                tracing::warn!(job_id = %request.job_id, error = %e, "could not mark job failed");
            }
            let _ = sink.emit(&BatchEvent::Error { error: message });
            Err(err)
        }
    }
}

async fn run_batch_inner<S, E>(
    store: &S,
    client: &GeminiClient,
    fetcher: &ImageFetcher,
    sink: &E,
    request: &BatchRequest,
) -> Result<BatchSummary, GenerateError>
where
    S: GenerationStore,
    E: EventSink,
{
    let total = request.product_ids.len();

    let _ = sink.emit(&BatchEvent::Connected {
        job_id: request.job_id,
        total_products: total,
        fields: request.fields.clone(),
    });

    store.mark_job_running(request.job_id).await?;

    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut cancelled = false;

    for (index, &product_id) in request.product_ids.iter().enumerate() {
        if sink.is_closed() {
            tracing::info!(job_id = %request.job_id, "consumer disconnected — stopping batch");
            cancelled = true;
            break;
        }

        let _ = sink.emit(&BatchEvent::ProductStart {
            product_id,
            index: index + 1,
            total,
        });

        match process_product(store, client, fetcher, sink, request, product_id).await {
            Ok(ProductOutcome::Cancelled) => {
                cancelled = true;
                break;
            }
            Ok(ProductOutcome::Completed) => {
                successful += 1;
                let _ = sink.emit(&BatchEvent::ProductComplete { product_id });
            }
            Err(err) => {
                failed += 1;
                let message = truncate_chars(&err.to_string(), ERROR_MESSAGE_MAX_CHARS);
                tracing::warn!(
                    job_id = %request.job_id,
                    product_id = %product_id,
                    error = %message,
                    "product failed — continuing with the rest of the batch"
                );
                // Best-effort: a failure while recording the failure must not
                // take down the batch.
                if let Err(e) = store
                    .update_item(request.job_id, product_id, ItemStatus::Failed, Some(&message))
                    .await
                {
                    tracing::warn!(product_id = %product_id, error = %e, "could not record item failure");
                }
                let _ = sink.emit(&BatchEvent::ProductError {
                    product_id,
                    error: message,
                });
            }
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        store
            .update_progress(
                request.job_id,
                (successful + failed) as i32,
                successful as i32,
                failed as i32,
            )
            .await?;
    }

    if cancelled {
        return Ok(BatchSummary {
            total,
            successful,
            failed,
            status: JobStatus::Running,
            cancelled: true,
        });
    }

    // `failed` only when every product failed; partial success still counts
    // as a completed run. Item rows carry the per-product detail.
    let status = if failed == total {
        JobStatus::Failed
    } else {
        JobStatus::Completed
    };

    store.finish_job(request.job_id, status, None).await?;

    let _ = sink.emit(&BatchEvent::BatchComplete {
        total,
        successful,
        failed,
        status,
    });

    Ok(BatchSummary {
        total,
        successful,
        failed,
        status,
        cancelled: false,
    })
}

/// Generates all enabled fields for one product and persists the merged
/// draft. Any error is caught by the caller and recorded against the item.
async fn process_product<S, E>(
    store: &S,
    client: &GeminiClient,
    fetcher: &ImageFetcher,
    sink: &E,
    request: &BatchRequest,
    product_id: Uuid,
) -> Result<ProductOutcome, ProductFailure>
where
    S: GenerationStore,
    E: EventSink,
{
    store
        .update_item(request.job_id, product_id, ItemStatus::Processing, None)
        .await?;

    let row: ProductRow = store
        .fetch_product(request.store_id, product_id)
        .await?
        .ok_or(ProductFailure::NotFound)?;

    let ctx = ProductContext::from_row(&row);
    let mut draft = FieldDraft::default();

    for &field in &request.fields {
        let _ = sink.emit(&BatchEvent::FieldStart { product_id, field });

        let preview_text = if field == FieldType::AltText {
            match generate_alt_texts(client, fetcher, sink, &ctx, &request.settings, &mut draft)
                .await?
            {
                Some(count) => format!("generated alt text for {count} images"),
                // Sink closed mid-image: stop without persisting anything.
                None => return Ok(ProductOutcome::Cancelled),
            }
        } else {
            let prompt = field_prompt(field, &ctx, &request.settings);
            let raw = client.generate_text(&request.settings.model, &prompt).await?;
            let value = clean_generated(&raw);
            let text = preview(&value);
            draft.set_scalar(field, value);
            text
        };

        let _ = sink.emit(&BatchEvent::FieldComplete {
            product_id,
            field,
            preview: preview_text,
        });
    }

    if !draft.is_empty() {
        let merged: Value = draft.merge_into(&row.draft_content);
        store.save_draft(product_id, &merged).await?;
    }

    store
        .update_item(request.job_id, product_id, ItemStatus::Completed, None)
        .await?;
    Ok(ProductOutcome::Completed)
}

/// Sequentially generates alt text for each product image, accumulating into
/// the draft's `images` array. Returns the image count, or `None` when the
/// sink closed partway and the remaining images were abandoned.
async fn generate_alt_texts<E>(
    client: &GeminiClient,
    fetcher: &ImageFetcher,
    sink: &E,
    ctx: &ProductContext,
    settings: &GenerationSettings,
    draft: &mut FieldDraft,
) -> Result<Option<usize>, ProductFailure>
where
    E: EventSink,
{
    let mut images: Vec<ImageAlt> = Vec::with_capacity(ctx.image_urls.len());

    for url in &ctx.image_urls {
        if sink.is_closed() {
            return Ok(None);
        }

        let fetched = if settings.analyze_images {
            fetcher.fetch(url).await
        } else {
            None
        };

        let prompt = alt_text_prompt(ctx, settings, url, fetched.is_some());
        let raw = match fetched {
            Some(image) => {
                client
                    .generate_with_image(
                        &settings.model,
                        &prompt,
                        &image.mime_type,
                        &image.data_base64,
                    )
                    .await?
            }
            None => client.generate_text(&settings.model, &prompt).await?,
        };

        images.push(ImageAlt {
            url: url.clone(),
            alt: clean_generated(&raw),
        });
    }

    let count = images.len();
    if count > 0 {
        draft.images = Some(images);
    }
    Ok(Some(count))
}

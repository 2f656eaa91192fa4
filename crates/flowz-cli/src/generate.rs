//! The `generate` subcommand: runs one batch end-to-end from the terminal,
//! using the same orchestrator as the server's SSE endpoint but with events
//! reported through tracing.

use std::collections::HashMap;

use clap::Args;
use uuid::Uuid;

use flowz_core::{enabled_fields, AppConfig, FieldType, GenerationSettings};
use flowz_gemini::{GeminiClient, RetryPolicy};
use flowz_generate::{
    run_batch, BatchEvent, BatchRequest, EventSink, ImageFetcher, PgStore, SinkClosed,
};

#[derive(Debug, Args)]
pub(crate) struct GenerateArgs {
    /// Target store id.
    #[arg(long)]
    store_id: Uuid,
    /// Product ids to process, comma separated.
    #[arg(long, value_delimiter = ',', required = true)]
    product_ids: Vec<Uuid>,
    /// Content fields to generate, comma separated
    /// (title, short_description, description, seo_title, meta_description, sku, alt_text).
    #[arg(long, value_delimiter = ',', required = true, value_parser = parse_field)]
    fields: Vec<FieldType>,
    /// Writing tone.
    #[arg(long)]
    tone: Option<String>,
    /// Output language code.
    #[arg(long)]
    language: Option<String>,
    /// Gemini model name.
    #[arg(long)]
    model: Option<String>,
    /// Download product images and use the vision path for alt text.
    #[arg(long)]
    analyze_images: bool,
}

fn parse_field(s: &str) -> Result<FieldType, String> {
    serde_json::from_value(serde_json::Value::String(s.to_owned()))
        .map_err(|_| format!("unknown field type: {s}"))
}

pub(crate) async fn run(config: &AppConfig, args: GenerateArgs) -> anyhow::Result<()> {
    let Some(api_key) = &config.gemini_api_key else {
        anyhow::bail!("GEMINI_API_KEY is not set; cannot run generation");
    };

    let pool_config = flowz_db::PoolConfig::from_app_config(config);
    let pool = flowz_db::connect_pool(&config.database_url, pool_config).await?;

    let store = flowz_db::get_store(&pool, args.store_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("store '{}' not found", args.store_id))?;

    let mut settings = GenerationSettings::default();
    if let Some(tone) = args.tone {
        settings.tone = tone;
    }
    if let Some(language) = args.language {
        settings.language = language;
    }
    if let Some(model) = args.model {
        settings.model = model;
    }
    settings.analyze_images = args.analyze_images;

    let content_types: HashMap<FieldType, bool> =
        args.fields.iter().map(|&f| (f, true)).collect();
    let fields = enabled_fields(&content_types);

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let total_items = args.product_ids.len() as i32;

    let job = flowz_db::create_generation_job(
        &pool,
        store.id,
        store.owner_id,
        &serde_json::to_value(&content_types)?,
        &serde_json::to_value(&settings)?,
        total_items,
    )
    .await?;
    flowz_db::create_job_items(&pool, job.id, &args.product_ids).await?;

    let client = GeminiClient::with_base_url(
        api_key,
        config.gemini_request_timeout_secs,
        RetryPolicy::from_app_config(config),
        &config.gemini_base_url,
    )?;
    let fetcher = ImageFetcher::new(
        config.image_fetch_timeout_secs,
        config.image_fetch_max_bytes,
    )?;
    let pg_store = PgStore::new(pool);

    let request = BatchRequest {
        job_id: job.id,
        store_id: store.id,
        product_ids: args.product_ids,
        fields,
        settings,
    };

    let summary = run_batch(&pg_store, &client, &fetcher, &TracingSink, &request).await?;

    println!(
        "job {} finished: {} of {} products succeeded, {} failed, status {}",
        job.id, summary.successful, summary.total, summary.failed, summary.status
    );
    Ok(())
}

/// Sink that logs every event; a terminal has no way to disconnect, so it
/// never reports closure.
struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &BatchEvent) -> Result<(), SinkClosed> {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(event = %json, "batch progress"),
            Err(e) => tracing::warn!(error = %e, "could not encode batch event"),
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_field_accepts_wire_names() {
        assert_eq!(parse_field("title"), Ok(FieldType::Title));
        assert_eq!(parse_field("alt_text"), Ok(FieldType::AltText));
        assert!(parse_field("banner").is_err());
    }

    #[test]
    fn tracing_sink_never_closes() {
        let sink = TracingSink;
        assert!(!sink.is_closed());
        assert!(sink.emit(&BatchEvent::Heartbeat).is_ok());
    }
}

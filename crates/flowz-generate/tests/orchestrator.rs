//! End-to-end batch runs against an in-memory store and a mocked Gemini API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowz_core::{FieldType, GenerationSettings, ItemStatus, JobStatus};
use flowz_db::ProductRow;
use flowz_gemini::{GeminiClient, RetryPolicy};
use flowz_generate::{
    run_batch, BatchEvent, BatchRequest, EventSink, GenerationStore, ImageFetcher, SinkClosed,
    StoreError,
};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    job_running: bool,
    /// product id → (status, error message)
    items: HashMap<Uuid, (String, Option<String>)>,
    drafts: HashMap<Uuid, Value>,
    progress: Vec<(i32, i32, i32)>,
    finished: Option<(JobStatus, Option<String>)>,
}

struct InMemoryStore {
    products: HashMap<Uuid, ProductRow>,
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    fn new(products: Vec<ProductRow>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            state: Mutex::new(StoreState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().expect("store state lock")
    }
}

impl GenerationStore for InMemoryStore {
    async fn mark_job_running(&self, _job_id: Uuid) -> Result<(), StoreError> {
        self.state().job_running = true;
        Ok(())
    }

    async fn fetch_product(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<ProductRow>, StoreError> {
        Ok(self
            .products
            .get(&product_id)
            .filter(|p| p.store_id == store_id)
            .cloned())
    }

    async fn save_draft(&self, product_id: Uuid, draft_content: &Value) -> Result<(), StoreError> {
        self.state().drafts.insert(product_id, draft_content.clone());
        Ok(())
    }

    async fn update_item(
        &self,
        _job_id: Uuid,
        product_id: Uuid,
        status: ItemStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.state().items.insert(
            product_id,
            (status.as_str().to_owned(), error.map(ToOwned::to_owned)),
        );
        Ok(())
    }

    async fn update_progress(
        &self,
        _job_id: Uuid,
        processed: i32,
        successful: i32,
        failed: i32,
    ) -> Result<(), StoreError> {
        self.state().progress.push((processed, successful, failed));
        Ok(())
    }

    async fn finish_job(
        &self,
        _job_id: Uuid,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.state().finished = Some((status, error.map(ToOwned::to_owned)));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<BatchEvent>>,
    closed: AtomicBool,
}

impl RecordingSink {
    fn events(&self) -> Vec<BatchEvent> {
        self.events.lock().expect("events lock").clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &BatchEvent) -> Result<(), SinkClosed> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkClosed);
        }
        self.events.lock().expect("events lock").push(event.clone());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn product(store_id: Uuid, title: &str, working: Value, metadata: Value) -> ProductRow {
    ProductRow {
        id: Uuid::new_v4(),
        store_id,
        external_id: None,
        title: title.to_owned(),
        working_content: working,
        draft_content: json!({}),
        metadata,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn gemini(server: &MockServer) -> GeminiClient {
    GeminiClient::with_base_url(
        "test-key",
        30,
        RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 0,
            backoff_cap_ms: 0,
        },
        &server.uri(),
    )
    .expect("client")
}

fn fetcher() -> ImageFetcher {
    ImageFetcher::new(5, 1024).expect("fetcher")
}

fn request(store_id: Uuid, product_ids: Vec<Uuid>, fields: Vec<FieldType>) -> BatchRequest {
    BatchRequest {
        job_id: Uuid::new_v4(),
        store_id,
        product_ids,
        fields,
        settings: GenerationSettings::default(),
    }
}

fn success_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] }, "finishReason": "STOP" }
        ]
    })
}

fn safety_body() -> serde_json::Value {
    json!({ "error": { "message": "Blocked due to SAFETY" } })
}

fn kinds(events: &[BatchEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match e {
            BatchEvent::Connected { .. } => "connected",
            BatchEvent::Heartbeat => "heartbeat",
            BatchEvent::ProductStart { .. } => "product_start",
            BatchEvent::FieldStart { .. } => "field_start",
            BatchEvent::FieldComplete { .. } => "field_complete",
            BatchEvent::ProductComplete { .. } => "product_complete",
            BatchEvent::ProductError { .. } => "product_error",
            BatchEvent::BatchComplete { .. } => "batch_complete",
            BatchEvent::Error { .. } => "error",
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// Two products, titles only, generation always succeeds.
#[tokio::test]
async fn all_products_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Fresh Title")))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let p1 = product(store_id, "Alpha Mug", json!({}), json!({}));
    let p2 = product(store_id, "Beta Mug", json!({}), json!({}));
    let ids = vec![p1.id, p2.id];
    let store = InMemoryStore::new(vec![p1, p2]);
    let sink = RecordingSink::default();
    let req = request(store_id, ids.clone(), vec![FieldType::Title]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("batch should not fail fatally");

    assert_eq!(summary.total, 2);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.status, JobStatus::Completed);
    assert!(!summary.cancelled);

    assert_eq!(
        kinds(&sink.events()),
        vec![
            "connected",
            "product_start",
            "field_start",
            "field_complete",
            "product_complete",
            "product_start",
            "field_start",
            "field_complete",
            "product_complete",
            "batch_complete",
        ]
    );

    let events = sink.events();
    let last = events.last().expect("batch_complete event");
    assert_eq!(
        *last,
        BatchEvent::BatchComplete {
            total: 2,
            successful: 2,
            failed: 0,
            status: JobStatus::Completed,
        }
    );

    let state = store.state();
    assert!(state.job_running);
    assert_eq!(state.finished, Some((JobStatus::Completed, None)));
    assert_eq!(state.progress.last(), Some(&(2, 2, 0)));
    for id in ids {
        assert_eq!(state.items.get(&id).map(|(s, _)| s.as_str()), Some("completed"));
        assert_eq!(state.drafts[&id]["title"], "Fresh Title");
    }
}

/// A safety-blocked product fails after exactly one attempt; the batch
/// continues and still completes.
#[tokio::test]
async fn blocked_product_does_not_abort_the_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Alpha Mug"))
        .respond_with(ResponseTemplate::new(400).set_body_json(safety_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Beta Mug"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Beta Rewritten")))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let p1 = product(store_id, "Alpha Mug", json!({}), json!({}));
    let p2 = product(store_id, "Beta Mug", json!({}), json!({}));
    let (id1, id2) = (p1.id, p2.id);
    let store = InMemoryStore::new(vec![p1, p2]);
    let sink = RecordingSink::default();
    let req = request(store_id, vec![id1, id2], vec![FieldType::Title]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("batch should not fail fatally");

    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status, JobStatus::Completed, "partial success completes");

    // Content-blocked is never retried: exactly one call mentioned Alpha.
    let alpha_calls = server
        .received_requests()
        .await
        .expect("recorded requests")
        .iter()
        .filter(|r| String::from_utf8_lossy(&r.body).contains("Alpha Mug"))
        .count();
    assert_eq!(alpha_calls, 1, "blocked prompt must not be retried");

    assert_eq!(
        kinds(&sink.events()),
        vec![
            "connected",
            "product_start",
            "field_start",
            "product_error",
            "product_start",
            "field_start",
            "field_complete",
            "product_complete",
            "batch_complete",
        ]
    );

    let state = store.state();
    let (status, error) = state.items.get(&id1).expect("item for product 1");
    assert_eq!(status, "failed");
    assert!(
        error.as_deref().is_some_and(|e| e.contains("SAFETY")),
        "item error should carry the provider message: {error:?}"
    );
    assert_eq!(state.items.get(&id2).map(|(s, _)| s.as_str()), Some("completed"));
    assert_eq!(state.progress.last(), Some(&(2, 1, 1)));
}

/// Two 503s then success: three attempts total, the product still completes.
#[tokio::test]
async fn transient_errors_are_retried_within_a_product() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "The model is overloaded." }
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Finally")))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let p1 = product(store_id, "Gamma Mug", json!({}), json!({}));
    let id1 = p1.id;
    let store = InMemoryStore::new(vec![p1]);
    let sink = RecordingSink::default();
    let req = request(store_id, vec![id1], vec![FieldType::Title]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("batch should not fail fatally");

    assert_eq!(summary.successful, 1);
    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(
        server.received_requests().await.map(|r| r.len()),
        Some(3),
        "two failures plus one success"
    );
    assert!(kinds(&sink.events()).contains(&"field_complete"));
    assert_eq!(store.state().drafts[&id1]["title"], "Finally");
}

/// Every product fails → terminal status `failed`.
#[tokio::test]
async fn batch_fails_when_every_product_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(safety_body()))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let p1 = product(store_id, "Alpha Mug", json!({}), json!({}));
    let p2 = product(store_id, "Beta Mug", json!({}), json!({}));
    let ids = vec![p1.id, p2.id];
    let store = InMemoryStore::new(vec![p1, p2]);
    let sink = RecordingSink::default();
    let req = request(store_id, ids, vec![FieldType::Title]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("all-failed is not a fatal error");

    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.status, JobStatus::Failed);

    let events = sink.events();
    assert!(matches!(
        events.last(),
        Some(BatchEvent::BatchComplete {
            status: JobStatus::Failed,
            ..
        })
    ));
    assert_eq!(store.state().finished, Some((JobStatus::Failed, None)));
}

/// A missing product fails its item but later products still run.
#[tokio::test]
async fn missing_product_is_skipped_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Still Works")))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let ghost_id = Uuid::new_v4();
    let p2 = product(store_id, "Beta Mug", json!({}), json!({}));
    let id2 = p2.id;
    let store = InMemoryStore::new(vec![p2]);
    let sink = RecordingSink::default();
    let req = request(store_id, vec![ghost_id, id2], vec![FieldType::Title]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("batch should not fail fatally");

    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.status, JobStatus::Completed);

    let state = store.state();
    let (status, error) = state.items.get(&ghost_id).expect("ghost item");
    assert_eq!(status, "failed");
    assert_eq!(error.as_deref(), Some("product not found in store"));
    assert_eq!(state.items.get(&id2).map(|(s, _)| s.as_str()), Some("completed"));
}

/// Alt text replaces the images array wholesale and reports a count preview.
#[tokio::test]
async fn alt_text_rewrites_the_image_array() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("A stoneware mug on a table")))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let mut p1 = product(
        store_id,
        "Alpha Mug",
        json!({
            "images": [
                {"url": "https://cdn.example.com/a.jpg"},
                {"url": "https://cdn.example.com/b.jpg"}
            ]
        }),
        json!({}),
    );
    p1.draft_content = json!({
        "title": "Kept Title",
        "images": [ {"url": "https://cdn.example.com/old.jpg", "alt": "stale"} ]
    });
    let id1 = p1.id;
    let store = InMemoryStore::new(vec![p1]);
    let sink = RecordingSink::default();
    let req = request(store_id, vec![id1], vec![FieldType::AltText]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("batch should not fail fatally");
    assert_eq!(summary.successful, 1);

    let events = sink.events();
    let preview = events.iter().find_map(|e| match e {
        BatchEvent::FieldComplete { preview, .. } => Some(preview.clone()),
        _ => None,
    });
    assert_eq!(preview.as_deref(), Some("generated alt text for 2 images"));

    let state = store.state();
    let draft = &state.drafts[&id1];
    assert_eq!(draft["title"], "Kept Title", "unrelated draft keys survive");
    let images = draft["images"].as_array().expect("images");
    assert_eq!(images.len(), 2, "old images array fully replaced");
    assert_eq!(images[0]["url"], "https://cdn.example.com/a.jpg");
    assert_eq!(images[0]["alt"], "A stoneware mug on a table");
}

/// A sink that is already closed stops the batch before the first product:
/// no generation calls, no terminal status write.
#[tokio::test]
async fn closed_sink_cancels_before_first_product() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Unreached")))
        .expect(0)
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let p1 = product(store_id, "Alpha Mug", json!({}), json!({}));
    let id1 = p1.id;
    let store = InMemoryStore::new(vec![p1]);
    let sink = RecordingSink::default();
    sink.close();
    let req = request(store_id, vec![id1], vec![FieldType::Title]);

    let summary = run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("cancellation is not an error");

    assert!(summary.cancelled);
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 0);

    let state = store.state();
    assert!(state.finished.is_none(), "no terminal status after cancel");
    assert!(state.progress.is_empty());
    assert!(state.items.is_empty());
    server.verify().await;
}

/// Fields are generated in the fixed order regardless of request order, and
/// SEO values nest under `seo` in the persisted draft.
#[tokio::test]
async fn fields_process_in_fixed_order_and_nest_seo() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Generated")))
        .mount(&server)
        .await;

    let store_id = Uuid::new_v4();
    let p1 = product(store_id, "Alpha Mug", json!({}), json!({}));
    let id1 = p1.id;
    let store = InMemoryStore::new(vec![p1]);
    let sink = RecordingSink::default();
    // The HTTP layer sorts enabled fields into FieldType::ORDERED; mimic it.
    let req = request(
        store_id,
        vec![id1],
        vec![FieldType::Title, FieldType::SeoTitle, FieldType::MetaDescription],
    );

    run_batch(&store, &gemini(&server), &fetcher(), &sink, &req)
        .await
        .expect("batch should not fail fatally");

    let fields: Vec<FieldType> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            BatchEvent::FieldStart { field, .. } => Some(*field),
            _ => None,
        })
        .collect();
    assert_eq!(
        fields,
        vec![FieldType::Title, FieldType::SeoTitle, FieldType::MetaDescription]
    );

    let state = store.state();
    let draft = &state.drafts[&id1];
    assert_eq!(draft["title"], "Generated");
    assert_eq!(draft["seo"]["title"], "Generated");
    assert_eq!(draft["seo"]["description"], "Generated");
}

//! The batch content-generation orchestrator.
//!
//! Drives a strictly sequential pipeline over a list of products: for each
//! enabled content field, builds a prompt, calls the generation API with
//! bounded retries, accumulates a per-product draft, persists results
//! product-by-product, and reports progress through an injected event sink.
//! A failure on one product never aborts the batch.

pub mod context;
pub mod draft;
pub mod events;
pub mod image_fetch;
pub mod orchestrator;
mod prompt;
pub mod store;

pub use context::ProductContext;
pub use draft::{FieldDraft, ImageAlt};
pub use events::{truncate_chars, BatchEvent, EventSink, SinkClosed};
pub use image_fetch::{FetchedImage, ImageFetcher};
pub use orchestrator::{run_batch, BatchRequest, BatchSummary, GenerateError};
pub use store::{GenerationStore, PgStore, StoreError};

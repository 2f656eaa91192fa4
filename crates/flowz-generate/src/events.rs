//! Progress events and the sink interface they are pushed through.
//!
//! The orchestrator is decoupled from the transport: the server wires a sink
//! backed by an SSE channel, the CLI one backed by tracing, tests a recording
//! sink. Emission is best-effort — once a sink reports closure the
//! orchestrator stops sending and winds down at the next checkpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use flowz_core::{FieldType, JobStatus};

/// Maximum length of the text preview attached to `field_complete`.
const PREVIEW_MAX_CHARS: usize = 100;

/// One message on the progress stream. Serialized with a `type` discriminator
/// matching the dashboard's wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Sent exactly once, before any generation starts.
    Connected {
        job_id: Uuid,
        total_products: usize,
        fields: Vec<FieldType>,
    },
    /// Keep-alive, injected by the transport on a fixed interval.
    Heartbeat,
    ProductStart {
        product_id: Uuid,
        /// 1-based position within the batch.
        index: usize,
        total: usize,
    },
    FieldStart {
        product_id: Uuid,
        field: FieldType,
    },
    FieldComplete {
        product_id: Uuid,
        field: FieldType,
        /// First 100 characters of the generated value, or an image count
        /// summary for alt text.
        preview: String,
    },
    ProductComplete {
        product_id: Uuid,
    },
    ProductError {
        product_id: Uuid,
        error: String,
    },
    /// Sent exactly once after the loop, unless the run died fatally.
    BatchComplete {
        total: usize,
        successful: usize,
        failed: usize,
        status: JobStatus,
    },
    /// Fatal failure outside the per-product error handling.
    Error {
        error: String,
    },
}

/// The consumer went away; further emits will be suppressed.
#[derive(Debug, Error)]
#[error("event stream closed by the consumer")]
pub struct SinkClosed;

/// Destination for [`BatchEvent`]s.
///
/// `emit` must not block on the consumer: transports buffer or drop. A failed
/// emit flips the sink into the closed state, after which [`EventSink::is_closed`]
/// returns `true` and the orchestrator stops at its next checkpoint.
pub trait EventSink: Send + Sync {
    /// Pushes one event. Best-effort.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] once the consumer has gone away.
    fn emit(&self, event: &BatchEvent) -> Result<(), SinkClosed>;

    /// Whether the consumer is known to be gone.
    fn is_closed(&self) -> bool;
}

/// Truncates to at most `max_chars` characters, respecting char boundaries.
///
/// Used for `field_complete` previews (100) and persisted item error
/// messages (500).
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Builds the preview string for a generated scalar field.
pub(crate) fn preview(text: &str) -> String {
    truncate_chars(text, PREVIEW_MAX_CHARS)
}

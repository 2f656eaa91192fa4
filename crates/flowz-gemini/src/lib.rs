//! HTTP client for the Gemini `generateContent` API.
//!
//! Wraps `reqwest` with typed request/response handling, a failure
//! classification taxonomy, and retry with exponential back-off and jitter.
//! The orchestrator owns prompt text; this crate owns everything between a
//! prompt and a cleaned text result.

pub mod client;
pub mod error;
pub mod retry;
mod types;

pub use client::GeminiClient;
pub use error::{FailureKind, GeminiError};
pub use retry::RetryPolicy;

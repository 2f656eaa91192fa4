//! The Gemini HTTP client.

use std::time::Duration;

use reqwest::{Client, Url};

use crate::error::{classify, FailureKind, GeminiError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::types::{
    Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, Part,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini `generateContent` API.
///
/// Built once at startup from explicit configuration and shared across a
/// batch run; there is no ambient singleton. Use
/// [`GeminiClient::with_base_url`] to point at a mock server in tests.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: Url,
    retry: RetryPolicy,
}

impl GeminiClient {
    /// Creates a client pointed at the production Gemini API.
    ///
    /// # Errors
    ///
    /// Returns [`GeminiError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(
        api_key: &str,
        timeout_secs: u64,
        retry: RetryPolicy,
    ) -> Result<Self, GeminiError> {
        Self::with_base_url(api_key, timeout_secs, retry, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`GeminiError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`GeminiError::Api`] if `base_url` is not a
    /// valid URL.
    pub fn with_base_url(
        api_key: &str,
        timeout_secs: u64,
        retry: RetryPolicy,
        base_url: &str,
    ) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("flowz/0.1 (batch-generation)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| GeminiError::Api {
            kind: FailureKind::Unknown,
            status: None,
            message: format!("invalid base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
            retry,
        })
    }

    /// Generates text for a prompt, retrying transient failures per the
    /// client's [`RetryPolicy`].
    ///
    /// # Errors
    ///
    /// Returns the last [`GeminiError`] once retries are exhausted, or
    /// immediately for a [`FailureKind::ContentBlocked`] refusal.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, GeminiError> {
        retry_with_backoff(self.retry, || {
            self.generate_once(model, vec![Part::text(prompt)])
        })
        .await
    }

    /// Generates text for a prompt plus an inline image (vision path), with
    /// the same retry behavior as [`Self::generate_text`].
    ///
    /// `data_base64` is the base64-encoded image body; `mime_type` its
    /// content type (e.g. `image/jpeg`).
    ///
    /// # Errors
    ///
    /// Returns the last [`GeminiError`] once retries are exhausted, or
    /// immediately for a [`FailureKind::ContentBlocked`] refusal.
    pub async fn generate_with_image(
        &self,
        model: &str,
        prompt: &str,
        mime_type: &str,
        data_base64: &str,
    ) -> Result<String, GeminiError> {
        retry_with_backoff(self.retry, || {
            self.generate_once(
                model,
                vec![
                    Part::text(prompt),
                    Part::inline_image(mime_type, data_base64),
                ],
            )
        })
        .await
    }

    /// One `generateContent` round trip without retry.
    async fn generate_once(&self, model: &str, parts: Vec<Part>) -> Result<String, GeminiError> {
        let url = self.build_url(model)?;
        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
        };

        let response = self.client.post(url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map_or(body, |envelope| envelope.error.message);
            return Err(GeminiError::Api {
                kind: classify(Some(status.as_u16()), &message),
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| GeminiError::Deserialize {
                context: format!("generateContent({model})"),
                source: e,
            })?;

        if let Some(reason) = parsed
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(GeminiError::Api {
                kind: FailureKind::ContentBlocked,
                status: None,
                message: format!("prompt blocked: {reason}"),
            });
        }

        let candidate = parsed.candidates.into_iter().next();

        if let Some(reason) = candidate
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| r.eq_ignore_ascii_case("safety"))
        {
            return Err(GeminiError::Api {
                kind: FailureKind::ContentBlocked,
                status: None,
                message: format!("candidate blocked: finish reason {reason}"),
            });
        }

        let text = candidate
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(GeminiError::EmptyResponse);
        }

        Ok(text.to_owned())
    }

    fn build_url(&self, model: &str) -> Result<Url, GeminiError> {
        let mut url = self
            .base_url
            .join(&format!("v1beta/models/{model}:generateContent"))
            .map_err(|e| GeminiError::Api {
                kind: FailureKind::Unknown,
                status: None,
                message: format!("invalid model path '{model}': {e}"),
            })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

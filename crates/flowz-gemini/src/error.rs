use thiserror::Error;

/// Classification of a failed generation call, used to decide retry behavior
/// and reported in logs and job item errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429 or a message mentioning quota / rate limits. Retryable.
    QuotaExceeded,
    /// HTTP 503 or a message mentioning unavailability. Retryable.
    ServiceUnavailable,
    /// The provider refused the content on safety grounds. Never retried:
    /// the same prompt will be refused again.
    ContentBlocked,
    /// A timeout or deadline error, from the provider or the transport. Retryable.
    Timeout,
    /// Anything unrecognized. Retryable.
    Unknown,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::QuotaExceeded => "QUOTA_EXCEEDED",
            FailureKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            FailureKind::ContentBlocked => "CONTENT_BLOCKED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a failed generation call from its HTTP status and message.
///
/// First match wins, in this order: quota (429 / "quota" / "rate limit"),
/// unavailable (503 / "unavailable"), blocked ("safety" / "blocked" /
/// "harmful"), timeout ("timeout" / "deadline"), then [`FailureKind::Unknown`].
#[must_use]
pub fn classify(status: Option<u16>, message: &str) -> FailureKind {
    let msg = message.to_ascii_lowercase();

    if status == Some(429) || msg.contains("quota") || msg.contains("rate limit") {
        FailureKind::QuotaExceeded
    } else if status == Some(503) || msg.contains("unavailable") {
        FailureKind::ServiceUnavailable
    } else if msg.contains("safety") || msg.contains("blocked") || msg.contains("harmful") {
        FailureKind::ContentBlocked
    } else if msg.contains("timeout") || msg.contains("deadline") {
        FailureKind::Timeout
    } else {
        FailureKind::Unknown
    }
}

/// Errors returned by the Gemini client.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status or refused the prompt.
    #[error("generation failed ({kind}): {message}")]
    Api {
        kind: FailureKind,
        status: Option<u16>,
        message: String,
    },

    /// A 2xx response whose candidates carried no text. Treated like any
    /// transient failure and retried.
    #[error("generation returned an empty text payload")]
    EmptyResponse,

    /// The response body could not be deserialized into the expected shape.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GeminiError {
    /// The classification used for reporting. Errors without an API status
    /// are folded into the taxonomy by message content.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            GeminiError::Api { kind, .. } => *kind,
            GeminiError::Http(e) if e.is_timeout() => FailureKind::Timeout,
            GeminiError::Http(_) | GeminiError::EmptyResponse | GeminiError::Deserialize { .. } => {
                FailureKind::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_429_as_quota() {
        assert_eq!(classify(Some(429), "anything"), FailureKind::QuotaExceeded);
    }

    #[test]
    fn classifies_quota_message_without_status() {
        assert_eq!(
            classify(None, "Resource quota exhausted for project"),
            FailureKind::QuotaExceeded
        );
        assert_eq!(
            classify(None, "Rate limit reached, slow down"),
            FailureKind::QuotaExceeded
        );
    }

    #[test]
    fn classifies_503_as_unavailable() {
        assert_eq!(
            classify(Some(503), "upstream overloaded"),
            FailureKind::ServiceUnavailable
        );
        assert_eq!(
            classify(None, "The model is temporarily UNAVAILABLE"),
            FailureKind::ServiceUnavailable
        );
    }

    #[test]
    fn classifies_safety_as_blocked() {
        assert_eq!(
            classify(Some(400), "Blocked due to SAFETY"),
            FailureKind::ContentBlocked
        );
        assert_eq!(
            classify(None, "response flagged as harmful"),
            FailureKind::ContentBlocked
        );
    }

    #[test]
    fn classifies_deadline_as_timeout() {
        assert_eq!(
            classify(None, "deadline exceeded after 60s"),
            FailureKind::Timeout
        );
    }

    #[test]
    fn quota_wins_over_later_matches() {
        // "rate limit" appears alongside "unavailable"; first match wins.
        assert_eq!(
            classify(None, "rate limit hit, service unavailable"),
            FailureKind::QuotaExceeded
        );
    }

    #[test]
    fn unrecognized_messages_are_unknown() {
        assert_eq!(classify(Some(500), "internal error"), FailureKind::Unknown);
    }
}

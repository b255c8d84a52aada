//! Error taxonomy for calls to external collaborators
//!
//! Provider and classifier calls return [`TriageError`] so the pipeline can
//! decide between retrying, skipping an item and stopping the run. Storage
//! and plumbing code uses `anyhow::Result` with context.

/// Failure of an external call or of a per-item precondition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriageError {
    /// Network failure, timeout, 5xx or rate limit; safe to retry
    #[error("transient provider error: {message}")]
    TransientProvider { message: String, rate_limited: bool },

    /// 4xx that retrying will not fix (auth, permission, bad request, not found)
    #[error("permanent provider error (HTTP {status}): {message}")]
    PermanentProvider { status: u16, message: String },

    /// Payload failed validation
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Per-run API call cap reached
    #[error("budget exceeded: {limit} API calls allowed per run")]
    BudgetExceeded { limit: usize },

    /// Bulk target missing or in the wrong state
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl TriageError {
    pub fn transient(message: impl Into<String>) -> Self {
        TriageError::TransientProvider {
            message: message.into(),
            rate_limited: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        TriageError::TransientProvider {
            message: message.into(),
            rate_limited: true,
        }
    }

    pub fn permanent(status: u16, message: impl Into<String>) -> Self {
        TriageError::PermanentProvider {
            status,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status
    ///
    /// Gmail signals quota exhaustion with 403 and a `rateLimitExceeded` or
    /// `userRateLimitExceeded` reason, so 403 bodies are inspected.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        match status {
            429 => TriageError::rate_limited(format!("HTTP 429: {}", snippet)),
            403 if is_quota_body(body) => {
                TriageError::rate_limited(format!("HTTP 403 quota: {}", snippet))
            }
            408 | 500..=599 => TriageError::transient(format!("HTTP {}: {}", status, snippet)),
            _ => TriageError::permanent(status, snippet),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TriageError::TransientProvider { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            TriageError::TransientProvider {
                rate_limited: true,
                ..
            }
        )
    }

    /// Credentials rejected: the whole account run must stop for re-auth
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            TriageError::PermanentProvider {
                status: 401 | 403,
                ..
            }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TriageError::PermanentProvider { status: 404, .. })
    }
}

fn is_quota_body(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("ratelimitexceeded") || lower.contains("quota")
}

impl From<ureq::Error> for TriageError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(status) => TriageError::from_http_status(status, ""),
            ureq::Error::Json(e) => TriageError::MalformedResponse(e.to_string()),
            other => TriageError::transient(other.to_string()),
        }
    }
}

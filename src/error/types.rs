//! Error types for the rotating Gemini client
//!
//! Provider failures are classified exactly once, at the transport edge, into
//! the closed set described by [`FailureKind`]. Everything above the transport
//! (the executor, callers) matches on the kind and never on message text.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Failure Classification
// ============================================================================

/// Classification of a single failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Per-credential quota hit (HTTP 429 / RESOURCE_EXHAUSTED)
    RateLimited,
    /// Provider overloaded (HTTP 503 / UNAVAILABLE)
    Overloaded,
    /// Anything else. Not retried.
    Fatal,
}

impl FailureKind {
    /// Whether another credential is expected to succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Overloaded)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::Overloaded => write!(f, "overloaded"),
            FailureKind::Fatal => write!(f, "fatal"),
        }
    }
}

// ============================================================================
// Provider Error
// ============================================================================

/// A failed call to the generative API, already classified
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} provider error: {message}")]
pub struct ProviderError {
    /// Classification used by the retry logic
    pub kind: FailureKind,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Provider message, for logs and callers
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: FailureKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, Some(429), message)
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Overloaded, Some(503), message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, None, message)
    }

    /// Classify an HTTP error response.
    ///
    /// `api_status` is the `error.status` field of a Gemini error body
    /// (e.g. `RESOURCE_EXHAUSTED`), when the body could be parsed.
    pub fn from_response(status: u16, api_status: Option<&str>, message: impl Into<String>) -> Self {
        let kind = match (status, api_status) {
            (429, _) | (_, Some("RESOURCE_EXHAUSTED")) => FailureKind::RateLimited,
            (503, _) | (_, Some("UNAVAILABLE")) => FailureKind::Overloaded,
            _ => FailureKind::Fatal,
        };
        Self::new(kind, Some(status), message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // No status means the request never got an answer; not a rotation signal.
        let status = err.status().map(|s| s.as_u16());
        match status {
            Some(code) => ProviderError::from_response(code, None, err.to_string()),
            None => ProviderError::new(FailureKind::Fatal, None, err.to_string()),
        }
    }
}

// ============================================================================
// Generate Error
// ============================================================================

/// Terminal outcome of a failed `generate` call
#[derive(Error, Debug)]
pub enum GenerateError {
    /// Non-transient failure on the first credential that saw it, returned unchanged
    #[error(transparent)]
    Fatal(ProviderError),

    /// Every credential and the fallback model failed
    #[error("{credentials} credentials and fallback model {fallback_model} all failed: {last_error}")]
    Exhausted {
        credentials: usize,
        fallback_model: String,
        last_error: ProviderError,
    },

    #[error("Generate call exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

impl GenerateError {
    /// Capacity problem rather than a bad request
    pub fn is_exhausted(&self) -> bool {
        matches!(self, GenerateError::Exhausted { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, GenerateError::Fatal(_))
    }

    /// The provider error behind this failure, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            GenerateError::Fatal(err) => Some(err),
            GenerateError::Exhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

// ============================================================================
// Construction / Store Errors
// ============================================================================

/// Errors building a credential pool. Deployment misconfiguration, not request-time.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("No API credentials configured")]
    NoCredentials,

    #[error("Failed to build client for {credential}: {message}")]
    Client { credential: String, message: String },
}

/// Errors from the shared rotation store. Logged, never propagated past it.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_http_status() {
        assert_eq!(
            ProviderError::from_response(429, None, "quota").kind,
            FailureKind::RateLimited
        );
        assert_eq!(
            ProviderError::from_response(503, None, "busy").kind,
            FailureKind::Overloaded
        );
        assert_eq!(
            ProviderError::from_response(400, None, "bad").kind,
            FailureKind::Fatal
        );
        assert_eq!(
            ProviderError::from_response(500, None, "internal").kind,
            FailureKind::Fatal
        );
    }

    #[test]
    fn test_classify_by_api_status() {
        let err = ProviderError::from_response(400, Some("RESOURCE_EXHAUSTED"), "quota");
        assert_eq!(err.kind, FailureKind::RateLimited);
        assert_eq!(err.status, Some(400));

        let err = ProviderError::from_response(500, Some("UNAVAILABLE"), "overloaded");
        assert_eq!(err.kind, FailureKind::Overloaded);
    }

    #[test]
    fn test_generate_error_kinds() {
        let fatal = GenerateError::Fatal(ProviderError::fatal("bad request"));
        assert!(fatal.is_fatal());
        assert!(!fatal.is_exhausted());
        assert_eq!(fatal.to_string(), ProviderError::fatal("bad request").to_string());

        let exhausted = GenerateError::Exhausted {
            credentials: 3,
            fallback_model: "gemini-1.5-flash".to_string(),
            last_error: ProviderError::rate_limited("quota"),
        };
        assert!(exhausted.is_exhausted());
        assert!(exhausted.to_string().starts_with("3 credentials and fallback model gemini-1.5-flash"));
        assert_eq!(
            exhausted.provider_error().map(|e| e.kind),
            Some(FailureKind::RateLimited)
        );
    }
}

//! Grading-service error types.
//!
//! Defined in `quizsession-core` so the session machine can classify a
//! failed submission as retry-in-place or fatal without string matching.

use thiserror::Error;

/// Shown when a start failure carries no message from the service.
pub const START_FAILED_FALLBACK: &str = "Failed to start quiz";

/// Shown when a submit failure carries no message from the service.
pub const SUBMIT_FAILED_FALLBACK: &str = "Failed to submit quiz";

/// Errors returned by the start-attempt and submit-attempt calls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The quiz does not exist or is not published.
    #[error("quiz not found: {0}")]
    QuizNotFound(String),

    /// A new attempt may not be opened (e.g. attempt cap reached).
    #[error("attempt not permitted: {0}")]
    AttemptNotPermitted(String),

    /// The attempt was already scored, or is unknown to the service.
    #[error("attempt already submitted: {0}")]
    AlreadySubmitted(String),

    /// The service considers the attempt past its time limit.
    #[error("attempt expired: {0}")]
    AttemptExpired(String),

    /// The payload was rejected as malformed.
    #[error("invalid submission: {0}")]
    Validation(String),

    /// Credentials were missing or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request did not complete in time.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// A success response that could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ServiceError {
    /// Returns `true` if a failed submission may be retried in place.
    ///
    /// Fatal errors end the session in `Errored`.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_)
            | ServiceError::Timeout(_)
            | ServiceError::AttemptExpired(_)
            | ServiceError::Decode(_) => true,
            ServiceError::Api { status, .. } => {
                matches!(status, 408 | 429) || *status >= 500
            }
            ServiceError::QuizNotFound(_)
            | ServiceError::AttemptNotPermitted(_)
            | ServiceError::AlreadySubmitted(_)
            | ServiceError::Validation(_)
            | ServiceError::Unauthorized(_) => false,
        }
    }

    /// The human-readable message supplied by the service, if any.
    pub fn message(&self) -> Option<&str> {
        let message = match self {
            ServiceError::QuizNotFound(m)
            | ServiceError::AttemptNotPermitted(m)
            | ServiceError::AlreadySubmitted(m)
            | ServiceError::AttemptExpired(m)
            | ServiceError::Validation(m)
            | ServiceError::Unauthorized(m)
            | ServiceError::Api { message: m, .. } => m.as_str(),
            ServiceError::Timeout(_) | ServiceError::Network(_) | ServiceError::Decode(_) => {
                return None
            }
        };
        let message = message.trim();
        (!message.is_empty()).then_some(message)
    }

    /// The service message, or `fallback` when none was supplied.
    pub fn user_message(&self, fallback: &str) -> String {
        self.message().unwrap_or(fallback).to_string()
    }
}

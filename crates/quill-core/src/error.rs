//! Error types for the editing timeline

use thiserror::Error;

/// Result type alias for timeline operations
pub type TimelineResult<T> = Result<T, TimelineError>;

/// Main error type for the editing timeline
///
/// Routine absences (unknown request, missing file, no following stop) are
/// `Ok(None)` at the API surface and never appear here. Variants of this enum
/// signal either a caller-side logic bug (`SentinelExists`) or a failure in
/// one of the consumed services.
#[derive(Error, Debug, Clone)]
pub enum TimelineError {
    /// A second post-edit stop was requested for a request that already has one
    #[error("request {request_id} already has a post-edit stop")]
    SentinelExists { request_id: String },

    /// Content resolution errors
    #[error("content resolution error: {0}")]
    Resolve(String),

    /// Diff computation errors
    #[error("diff error: {0}")]
    Diff(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid input errors
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TimelineError {
    /// Create a new sentinel-exists error
    pub fn sentinel_exists(request_id: impl Into<String>) -> Self {
        Self::SentinelExists {
            request_id: request_id.into(),
        }
    }

    /// Create a new content resolution error
    pub fn resolve(message: impl Into<String>) -> Self {
        Self::Resolve(message.into())
    }

    /// Create a new diff error
    pub fn diff(message: impl Into<String>) -> Self {
        Self::Diff(message.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

impl From<serde_json::Error> for TimelineError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

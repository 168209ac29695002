//! Error types for the transport seam.
//!
//! Dispatch-level errors (unsupported callback data, handler failures) are
//! defined in `switchyard-framework`.

use thiserror::Error;

/// A boxed application error, as returned by handlers and resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by [`Bot`](crate::Bot) API calls and response delivery.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The bot is not connected to the platform.
    #[error("bot is not connected")]
    NotConnected,

    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,

    /// The platform rejected the call.
    #[error("API error ({code}): {description}")]
    Api {
        /// Platform error code.
        code: i64,
        /// Platform error description.
        description: String,
    },

    /// Failed to serialize or deserialize an API payload.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The response shape cannot perform the requested delivery.
    #[error("unsupported delivery: {0}")]
    Unsupported(&'static str),

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates a platform error.
    pub fn api(code: i64, description: impl Into<String>) -> Self {
        Self::Api {
            code,
            description: description.into(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

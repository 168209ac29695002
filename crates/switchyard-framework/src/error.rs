//! Error types for the Switchyard framework.

use switchyard_core::{ApiError, BoxError, UserId};
use thiserror::Error;

/// Errors raised while processing a single event.
///
/// Every variant is contained by the dispatcher: it is published on the
/// error channel and handed to the error resolvers, never returned to the
/// transport.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The callback carried no data, or data no handler is registered for.
    #[error("unsupported callback data: {}", .data.as_deref().unwrap_or("<none>"))]
    UnsupportedCallbackData {
        /// The raw callback token, if any.
        data: Option<String>,
    },

    /// An application handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// An application handler panicked.
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    /// Delivering a response (or an acknowledgment) failed.
    #[error("failed to deliver response: {0}")]
    Delivery(#[from] ApiError),

    /// Resolving or persisting user state failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// An error resolver itself failed.
    #[error("error resolver failed: {0}")]
    Resolver(#[source] BoxError),
}

impl DispatchError {
    /// Creates an unsupported-callback-data error.
    pub fn unsupported(data: Option<&str>) -> Self {
        Self::UnsupportedCallbackData {
            data: data.map(str::to_string),
        }
    }

    /// Returns `true` for [`DispatchError::UnsupportedCallbackData`].
    pub fn is_unsupported_callback(&self) -> bool {
        matches!(self, Self::UnsupportedCallbackData { .. })
    }
}

/// Errors raised by user-state stores and their backends.
#[derive(Debug, Error)]
pub enum StateError {
    /// Backend I/O failure.
    #[error("state backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored record no longer matches the state type.
    #[error("stored state for user {user_id} is corrupt: {source}")]
    Corrupt {
        user_id: UserId,
        source: serde_json::Error,
    },

    /// The record could not be serialized.
    #[error("failed to serialize state for user {user_id}: {source}")]
    Serialize {
        user_id: UserId,
        source: serde_json::Error,
    },

    /// Backend-specific failure.
    #[error("state backend error: {0}")]
    Backend(String),
}

/// Result type for user-state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised when encoding a callback payload.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be serialized.
    #[error("failed to encode callback payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// The encoded token exceeds the platform's callback data limit.
    #[error("encoded callback data is {len} bytes, platform limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised by [`DispatcherBuilder::build`](crate::DispatcherBuilder::build).
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// A command does not start with `/`.
    #[error("invalid command '{0}': commands must start with '/'")]
    InvalidCommand(String),

    /// A command appears twice in the command table.
    #[error("duplicate command '{0}' in command table")]
    DuplicateCommand(String),

    /// A handler is bound to a command missing from the command table.
    #[error("handler bound to unknown command '{0}'")]
    UnknownCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display() {
        assert_eq!(
            DispatchError::unsupported(None).to_string(),
            "unsupported callback data: <none>"
        );
        assert_eq!(
            DispatchError::unsupported(Some("xyz")).to_string(),
            "unsupported callback data: xyz"
        );
    }

    #[test]
    fn test_handler_error_keeps_source() {
        let err = DispatchError::Handler("boom".into());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("boom"));
    }
}

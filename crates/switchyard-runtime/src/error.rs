//! Runtime error types.

use thiserror::Error;

use switchyard_core::ApiError;
use switchyard_framework::{BuildError, StateError};

use crate::config::ConfigError;

/// Errors that can occur while setting up or running a bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The dispatcher rejected its command table.
    #[error("Dispatcher build error: {0}")]
    Build(#[from] BuildError),

    /// A platform call made by the runtime itself failed.
    #[error("Platform API error: {0}")]
    Api(#[from] ApiError),

    /// The state backend could not be prepared.
    #[error("State storage error: {0}")]
    State(#[from] StateError),

    /// Installing a shutdown signal handler failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

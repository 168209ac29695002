//! Configuration module for the Switchyard runtime.
//!
//! Layered loading with figment (defaults, config file, `SWITCHYARD_*`
//! environment variables, programmatic overrides) plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    BotSettings, DispatchSettings, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig, StorageKind, StorageSettings, SwitchyardConfig,
};
pub use validation::validate_config;

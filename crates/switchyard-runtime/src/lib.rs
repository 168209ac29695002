//! Switchyard Runtime - process-level plumbing for Switchyard bots.
//!
//! This crate provides:
//! - Layered configuration (`SwitchyardConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`)
//! - Configuration wiring for dispatchers and stores (`setup`)
//! - The update pump (`Runtime`, `UpdateSource`)
//!
//! ```ignore
//! use switchyard_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!
//!     let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot)
//!         .with_config(&config)
//!         .on_command("/start", start)
//!         .store(state_store(&config, |_| Flow::Idle)?)
//!         .build()?;
//!
//!     Runtime::new(dispatcher)
//!         .publish_commands(config.bot.publish_commands)
//!         .run(updates)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod setup;
pub mod storage;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, SwitchyardConfig, load_config, load_config_from_file,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents, init_from_config};
pub use runtime::{Runtime, RuntimeService, RuntimeStats, StreamSource, UpdateSource};
pub use setup::{DispatcherBuilderConfigExt, callback_codec, state_store};
pub use storage::ConfiguredBackend;

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{SwitchyardConfig, load_config};
    pub use crate::logging::init_from_config;
    pub use crate::runtime::{Runtime, UpdateSource};
    pub use crate::setup::{DispatcherBuilderConfigExt, callback_codec, state_store};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

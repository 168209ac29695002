//! # Switchyard
//!
//! Command, state and callback routing for chat bots.
//!
//! ## Overview
//!
//! Switchyard sits between a chat-platform transport and application
//! handlers. Every inbound event goes through a fixed pipeline: sender
//! filtering, route resolution, handler invocation, response delivery and,
//! when anything fails, error recovery. Failures never escape to the
//! transport; they are published on the "response error" channel and turned
//! into fallback responses where a resolver is configured.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌─────────┐     ┌────────────┐     ┌──────────────────────────┐
//! │ Transport │────▶│ Runtime │────▶│ Dispatcher │────▶│ command table            │──▶ Response
//! │ (Updates) │     │ (pump)  │     │            │────▶│ UserStateStore (state)   │──▶ Response
//! └───────────┘     └─────────┘     └────────────┘────▶│ CallbackCodec (payload)  │──▶ Response
//!                                         │            └──────────────────────────┘
//!                                         └──▶ ErrorEvents ("response error")
//! ```
//!
//! - **Runtime**: Pulls updates from a source and spawns one task per update
//! - **Dispatcher**: Resolves the route and contains every failure
//! - **Stores and codecs**: Pluggable providers of user state and callback payloads
//! - **Responses**: Objects that know how to deliver themselves through a `Bot`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchyard::prelude::*;
//!
//! async fn start(_ctx: MessageContext<()>) -> TextResponse {
//!     TextResponse::new("Hello!")
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     init_from_config(&config.logging);
//!
//!     let dispatcher: Dispatcher = Dispatcher::builder(my_bot())
//!         .with_config(&config)
//!         .on_command("/start", start)
//!         .build()?;
//!
//!     Runtime::new(dispatcher).run(my_updates()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: Load `switchyard.toml` (default)
//! - `yaml-config`: Load `switchyard.yaml`
//! - `json-log`: JSON log output
//! - `testing`: Recording `Bot` for application tests

pub use switchyard_core as core;
pub use switchyard_framework as framework;
pub use switchyard_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use switchyard::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use switchyard_runtime::{
        DispatcherBuilderConfigExt, Runtime, SwitchyardConfig, UpdateSource, callback_codec,
        init_from_config, load_config, state_store,
    };

    // Dispatcher and providers
    pub use switchyard_framework::{
        AllowList, CallbackCodec, DispatchError, DispatchOutcome, Dispatcher, ErrorEvents,
        JsonCallbackCodec, JsonUserStateStore, UserData, UserStateStore,
    };

    // Handler contexts
    pub use switchyard_framework::{
        CallbackContext, CallbackErrorContext, MessageContext, MessageErrorContext,
    };

    // Platform types and responses
    pub use switchyard_core::{
        Bot, BotCommand, BoxedBot, CallbackQuery, InlineButton, InlineKeyboard, Message, Response,
        StickerResponse, TextResponse, Update, User,
    };
}

//! # Switchyard Framework
//!
//! Routing and error containment for chat bots.
//!
//! This layer provides:
//! - [`Dispatcher`]: exact-match commands, state-driven message routing and
//!   payload-driven callback routing
//! - Handler traits implemented for plain async functions
//! - [`UserStateStore`] and [`CallbackCodec`], the two pluggable providers
//!   consulted by the router, with JSON reference implementations
//! - [`AllowList`] sender filtering
//! - [`ErrorEvents`], the "response error" channel every contained failure is
//!   published on
//!
//! The framework talks to the platform only through the
//! [`Bot`](switchyard_core::Bot) trait; the runtime crate feeds it events.

mod answer;
mod locks;

pub mod access;
pub mod callback;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;
pub mod service;
pub mod state;

pub use access::AllowList;
pub use callback::{
    CallbackCodec, DEFAULT_PAYLOAD_TAG_FIELD, JsonCallbackCodec, MAX_CALLBACK_DATA_LEN,
};
pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::{BuildError, CodecError, CodecResult, DispatchError, StateError, StateResult};
pub use events::{ErrorEvents, ErrorListener, ListenerId, RESPONSE_ERROR_EVENT};
pub use handler::{
    BoxFuture, BoxedCallbackHandler, BoxedMessageHandler, CallbackContext, CallbackErrorContext,
    CallbackErrorResolver, CallbackHandler, HandlerResult, IntoReply, MessageContext,
    MessageErrorContext, MessageErrorResolver, MessageHandler, Reply, into_callback_handler,
    into_message_handler,
};
pub use service::BoxedDispatchService;
pub use state::{
    DEFAULT_STATE_TAG_FIELD, FileBackend, JsonUserStateStore, MemoryBackend, StateBackend,
    UserData, UserStateStore,
};

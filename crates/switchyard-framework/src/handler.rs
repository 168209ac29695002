//! Handler system for the Switchyard framework.
//!
//! Handlers are plain async functions. A message handler takes a
//! [`MessageContext`], a callback handler takes a [`CallbackContext`], and both
//! return anything implementing [`IntoReply`]:
//!
//! ```rust,ignore
//! // No response
//! async fn log_only(ctx: MessageContext<State>) {}
//!
//! // Always respond
//! async fn start(ctx: MessageContext<State>) -> TextResponse {
//!     TextResponse::new("Welcome!")
//! }
//!
//! // Fallible, optional response
//! async fn delete(ctx: CallbackContext<Payload, State>) -> anyhow::Result<Option<TextResponse>> {
//!     // ...
//! }
//! ```
//!
//! Functions are turned into type-erased handlers through blanket
//! implementations of [`MessageHandler`] and [`CallbackHandler`], so they can
//! be stored in the registries of the dispatcher, the user-state store and the
//! callback codec.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use switchyard_core::{
    BoxError, BoxedBot, BoxedResponse, CallbackQuery, Message, Response, StickerResponse,
    TextResponse,
};

use crate::error::DispatchError;
use crate::state::UserData;

/// A type alias for a boxed, pinned future that is `Send`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler produced: a response to deliver, or nothing.
pub type Reply = Option<BoxedResponse>;

/// Result of invoking a handler or an error resolver.
pub type HandlerResult = Result<Reply, BoxError>;

// ============================================================================
// IntoReply
// ============================================================================

/// Conversion of handler return values into a [`HandlerResult`].
pub trait IntoReply {
    fn into_reply(self) -> HandlerResult;
}

impl IntoReply for () {
    fn into_reply(self) -> HandlerResult {
        Ok(None)
    }
}

impl<R: Response + 'static> IntoReply for Option<R> {
    fn into_reply(self) -> HandlerResult {
        Ok(self.map(|response| Box::new(response) as BoxedResponse))
    }
}

impl IntoReply for BoxedResponse {
    fn into_reply(self) -> HandlerResult {
        Ok(Some(self))
    }
}

impl IntoReply for TextResponse {
    fn into_reply(self) -> HandlerResult {
        Some(self).into_reply()
    }
}

impl IntoReply for StickerResponse {
    fn into_reply(self) -> HandlerResult {
        Some(self).into_reply()
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<BoxError>,
{
    fn into_reply(self) -> HandlerResult {
        self.map_err(Into::<BoxError>::into)?.into_reply()
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// Everything a message handler receives.
pub struct MessageContext<S> {
    /// The incoming message.
    pub message: Message,
    /// The sender's state record, when a user-state store is bound.
    pub user_data: Option<UserData<S>>,
    /// Reserved for parsed command arguments; always empty.
    pub commands: Vec<String>,
    /// The bot the message arrived on.
    pub bot: BoxedBot,
}

/// Everything a callback handler receives.
pub struct CallbackContext<P, S> {
    /// The decoded callback payload.
    pub data: P,
    /// The message carrying the pressed keyboard.
    pub message: Message,
    /// The raw callback query.
    pub query: CallbackQuery,
    /// The sender's state record, when a user-state store is bound.
    pub user_data: Option<UserData<S>>,
    /// The bot the callback arrived on.
    pub bot: BoxedBot,
}

/// Input of the message error resolver.
#[derive(Debug, Clone)]
pub struct MessageErrorContext {
    pub err: Arc<DispatchError>,
    pub message: Message,
}

/// Input of the callback error resolver.
#[derive(Debug, Clone)]
pub struct CallbackErrorContext {
    pub err: Arc<DispatchError>,
    pub message: Option<Message>,
    pub query: CallbackQuery,
}

// ============================================================================
// Handler traits
// ============================================================================

/// A type-erased message handler.
pub trait MessageHandler<S>: Send + Sync + 'static {
    fn call(&self, ctx: MessageContext<S>) -> BoxFuture<'static, HandlerResult>;
}

impl<S, F, Fut, R> MessageHandler<S> for F
where
    S: Send + 'static,
    F: Fn(MessageContext<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, ctx: MessageContext<S>) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

/// A shared message handler.
pub type BoxedMessageHandler<S> = Arc<dyn MessageHandler<S>>;

/// Converts a handler function into a [`BoxedMessageHandler`].
pub fn into_message_handler<S, H>(handler: H) -> BoxedMessageHandler<S>
where
    H: MessageHandler<S>,
{
    Arc::new(handler)
}

/// A type-erased callback handler.
pub trait CallbackHandler<P, S>: Send + Sync + 'static {
    fn call(&self, ctx: CallbackContext<P, S>) -> BoxFuture<'static, HandlerResult>;
}

impl<P, S, F, Fut, R> CallbackHandler<P, S> for F
where
    P: Send + 'static,
    S: Send + 'static,
    F: Fn(CallbackContext<P, S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    fn call(&self, ctx: CallbackContext<P, S>) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

/// A shared callback handler.
pub type BoxedCallbackHandler<P, S> = Arc<dyn CallbackHandler<P, S>>;

/// Converts a handler function into a [`BoxedCallbackHandler`].
pub fn into_callback_handler<P, S, H>(handler: H) -> BoxedCallbackHandler<P, S>
where
    H: CallbackHandler<P, S>,
{
    Arc::new(handler)
}

// ============================================================================
// Error resolvers
// ============================================================================

/// Produces a fallback response after a message failed to process.
pub trait MessageErrorResolver: Send + Sync + 'static {
    fn resolve(&self, ctx: MessageErrorContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> MessageErrorResolver for F
where
    F: Fn(MessageErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    fn resolve(&self, ctx: MessageErrorContext) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

/// Produces a fallback response after a callback query failed to process.
pub trait CallbackErrorResolver: Send + Sync + 'static {
    fn resolve(&self, ctx: CallbackErrorContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> CallbackErrorResolver for F
where
    F: Fn(CallbackErrorContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoReply,
{
    fn resolve(&self, ctx: CallbackErrorContext) -> BoxFuture<'static, HandlerResult> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_reply() })
    }
}

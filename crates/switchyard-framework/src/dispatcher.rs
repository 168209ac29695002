//! Event dispatcher for the Switchyard framework.
//!
//! The [`Dispatcher`] receives platform events and routes each one to at most
//! one application handler:
//!
//! - **Messages** go to the handler bound to the exact command text, or else
//!   to the handler registered for the sender's current state tag.
//! - **Callback queries** have their data decoded by the callback codec and
//!   go to the handler registered for the payload's discriminant.
//!
//! Every failure along the way (state resolution, handler errors and panics,
//! delivery) is contained: it is emitted on the [`ErrorEvents`] channel, the
//! matching error resolver is asked for a fallback response, and the fallback
//! is delivered. Nothing propagates back to the transport.
//!
//! ```rust,ignore
//! let dispatcher: Dispatcher<State, Payload> = Dispatcher::builder(bot)
//!     .command("/start", "Start the bot")
//!     .on_command("/start", start)
//!     .store(store)
//!     .codec(codec)
//!     .allow_list(AllowList::only(["alice"]))
//!     .on_message_error(apologize)
//!     .build()?;
//!
//! dispatcher.dispatch(update).await;
//! ```

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use switchyard_core::{
    ApiResult, BotCommand, BoxError, BoxedBot, CallbackQuery, Message, Update, UserId,
};
use tokio::sync::OwnedMutexGuard;
use tracing::{Instrument, debug, debug_span, warn};

use crate::access::AllowList;
use crate::answer::AnsweringBot;
use crate::callback::CallbackCodec;
use crate::error::{BuildError, DispatchError};
use crate::events::ErrorEvents;
use crate::handler::{
    BoxFuture, BoxedMessageHandler, CallbackContext, CallbackErrorContext, CallbackErrorResolver,
    HandlerResult, MessageContext, MessageErrorContext, MessageErrorResolver, MessageHandler,
    Reply, into_message_handler,
};
use crate::locks::UserLocks;
use crate::state::{UserData, UserStateStore};

// ============================================================================
// DispatchOutcome
// ============================================================================

/// How the dispatcher disposed of one event.
///
/// Informational only: errors never leave the dispatcher, they are reported
/// through [`ErrorEvents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The sender is not allowed; callbacks still got an empty acknowledgment.
    Rejected,
    /// No handler matched the message.
    Dropped,
    /// A handler ran and its response was delivered.
    Responded,
    /// A message handler ran and returned no response.
    NoResponse,
    /// The callback was answered with an empty acknowledgment only.
    Acknowledged,
    /// Processing failed and the error path delivered a fallback response or
    /// acknowledgment.
    Recovered,
    /// Processing failed and nothing was delivered.
    Failed,
    /// A callback arrived but no callback codec is bound.
    Unconfigured,
}

impl DispatchOutcome {
    /// Returns `true` if processing hit an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Recovered | Self::Failed)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

struct DispatcherInner<S, P> {
    bot: BoxedBot,
    commands: Vec<BotCommand>,
    command_handlers: HashMap<String, BoxedMessageHandler<S>>,
    store: Option<Arc<dyn UserStateStore<S>>>,
    codec: Option<Arc<dyn CallbackCodec<P, S>>>,
    allow_list: AllowList,
    message_resolver: Option<Arc<dyn MessageErrorResolver>>,
    callback_resolver: Option<Arc<dyn CallbackErrorResolver>>,
    events: Arc<ErrorEvents>,
    user_locks: Option<UserLocks>,
}

/// The central event router.
///
/// `S` is the user-state record type and `P` the callback payload type; both
/// default to `()` for bots that use neither. Cloning is cheap: all
/// registries are shared and immutable once built.
pub struct Dispatcher<S = (), P = ()> {
    inner: Arc<DispatcherInner<S, P>>,
}

impl<S, P> Clone for Dispatcher<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P> Dispatcher<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Starts building a dispatcher for `bot`.
    pub fn builder(bot: BoxedBot) -> DispatcherBuilder<S, P> {
        DispatcherBuilder::new(bot)
    }

    pub fn bot(&self) -> &BoxedBot {
        &self.inner.bot
    }

    /// The command table, in registration order.
    pub fn commands(&self) -> &[BotCommand] {
        &self.inner.commands
    }

    pub fn allow_list(&self) -> &AllowList {
        &self.inner.allow_list
    }

    pub fn error_events(&self) -> &Arc<ErrorEvents> {
        &self.inner.events
    }

    pub fn has_store(&self) -> bool {
        self.inner.store.is_some()
    }

    pub fn has_codec(&self) -> bool {
        self.inner.codec.is_some()
    }

    /// Publishes the command table to the platform for client-side
    /// discovery. Commands are sent without their leading `/`.
    pub async fn publish_commands(&self) -> ApiResult<()> {
        let commands: Vec<BotCommand> = self
            .inner
            .commands
            .iter()
            .map(|c| BotCommand::new(c.command.trim_start_matches('/'), c.description.clone()))
            .collect();
        debug!(count = commands.len(), "Publishing command table");
        self.inner.bot.set_my_commands(&commands).await
    }

    /// Dispatches any inbound event.
    pub async fn dispatch(&self, update: Update) -> DispatchOutcome {
        match update {
            Update::Message(message) => self.handle_message(message).await,
            Update::CallbackQuery(query) => self.handle_callback_query(query).await,
        }
    }

    /// Processes one text message.
    pub async fn handle_message(&self, message: Message) -> DispatchOutcome {
        let span = debug_span!(
            "dispatch",
            kind = "message",
            user_id = message.sender().map(|u| u.id)
        );
        self.process_message(message).instrument(span).await
    }

    /// Processes one callback query.
    pub async fn handle_callback_query(&self, query: CallbackQuery) -> DispatchOutcome {
        let span = debug_span!("dispatch", kind = "callback_query", user_id = query.from.id);
        self.process_callback(query).instrument(span).await
    }

    // ------------------------------------------------------------------------
    // Message path
    // ------------------------------------------------------------------------

    async fn process_message(&self, message: Message) -> DispatchOutcome {
        let sender = match message.sender() {
            Some(sender) if self.inner.allow_list.is_allowed(Some(sender)) => sender.id,
            _ => {
                debug!("Message sender not allowed, ignoring");
                return DispatchOutcome::Rejected;
            }
        };

        let _guard = self.lock_user(sender).await;
        match self.route_message(&message, sender).await {
            Ok(outcome) => outcome,
            Err(err) => self.recover_message(err, message).await,
        }
    }

    async fn route_message(
        &self,
        message: &Message,
        user_id: UserId,
    ) -> Result<DispatchOutcome, DispatchError> {
        let user_data = self.resolve_user_data(user_id).await?;

        let handler = message
            .text()
            .and_then(|text| self.inner.command_handlers.get(text).cloned())
            .or_else(|| {
                let store = self.inner.store.as_ref()?;
                store.lookup_handler(user_data.as_ref()?.record())
            });

        let Some(handler) = handler else {
            debug!("No handler matched message");
            return Ok(DispatchOutcome::Dropped);
        };

        let ctx = MessageContext {
            message: message.clone(),
            user_data,
            commands: Vec::new(),
            bot: Arc::clone(&self.inner.bot),
        };

        match invoke(handler.call(ctx)).await.map_err(DispatchError::from_failure)? {
            Some(response) => {
                response
                    .respond_to_message(message, self.inner.bot.as_ref())
                    .await?;
                Ok(DispatchOutcome::Responded)
            }
            None => Ok(DispatchOutcome::NoResponse),
        }
    }

    async fn recover_message(&self, err: DispatchError, message: Message) -> DispatchOutcome {
        let err = Arc::new(err);
        self.inner.events.emit(&err);

        let Some(resolver) = &self.inner.message_resolver else {
            return DispatchOutcome::Failed;
        };

        let ctx = MessageErrorContext {
            err,
            message: message.clone(),
        };
        let fallback = match invoke(resolver.resolve(ctx)).await {
            Ok(fallback) => fallback,
            Err(failure) => {
                self.inner.events.emit(&DispatchError::from_resolver_failure(failure));
                return DispatchOutcome::Failed;
            }
        };

        let Some(response) = fallback else {
            return DispatchOutcome::Failed;
        };

        match response
            .respond_to_message(&message, self.inner.bot.as_ref())
            .await
        {
            Ok(()) => DispatchOutcome::Recovered,
            Err(e) => {
                self.inner.events.emit(&DispatchError::Delivery(e));
                DispatchOutcome::Failed
            }
        }
    }

    // ------------------------------------------------------------------------
    // Callback path
    // ------------------------------------------------------------------------

    async fn process_callback(&self, query: CallbackQuery) -> DispatchOutcome {
        let bot = Arc::new(AnsweringBot::new(Arc::clone(&self.inner.bot), &query.id));

        let Some(message) = query.message.clone() else {
            debug!("Callback query has no originating message, acknowledging");
            return self.acknowledge(&bot, DispatchOutcome::Acknowledged).await;
        };
        if !self.inner.allow_list.is_allowed(Some(&query.from)) {
            debug!("Callback sender not allowed, acknowledging");
            return self.acknowledge(&bot, DispatchOutcome::Rejected).await;
        }

        let _guard = self.lock_user(query.from.id).await;
        match self.route_callback(&query, message, &bot).await {
            Ok(outcome) => outcome,
            Err(err) => self.recover_callback(err, query, &bot).await,
        }
    }

    async fn route_callback(
        &self,
        query: &CallbackQuery,
        message: Message,
        bot: &Arc<AnsweringBot>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(data) = query.data.as_deref() else {
            return Err(DispatchError::unsupported(None));
        };

        let Some(codec) = &self.inner.codec else {
            warn!("Callback query received but no callback codec is bound");
            bot.ensure_answered().await?;
            return Ok(DispatchOutcome::Unconfigured);
        };

        let (user_data, payload) = tokio::join!(
            self.resolve_user_data(query.from.id),
            codec.decode(data)
        );
        let user_data = user_data?;

        let Some(payload) = payload else {
            debug!("Callback data could not be decoded, acknowledging");
            bot.ensure_answered().await?;
            return Ok(DispatchOutcome::Acknowledged);
        };

        let Some(handler) = codec.lookup_handler(&payload) else {
            return Err(DispatchError::unsupported(Some(data)));
        };

        let ctx = CallbackContext {
            data: payload,
            message,
            query: query.clone(),
            user_data,
            bot: Arc::clone(bot) as BoxedBot,
        };

        match invoke(handler.call(ctx)).await.map_err(DispatchError::from_failure)? {
            Some(response) => {
                response
                    .respond_to_callback_query(query, &**bot)
                    .await?;
                bot.ensure_answered().await?;
                Ok(DispatchOutcome::Responded)
            }
            None => {
                bot.ensure_answered().await?;
                Ok(DispatchOutcome::Acknowledged)
            }
        }
    }

    async fn recover_callback(
        &self,
        err: DispatchError,
        query: CallbackQuery,
        bot: &Arc<AnsweringBot>,
    ) -> DispatchOutcome {
        let err = Arc::new(err);
        self.inner.events.emit(&err);

        let fallback = match &self.inner.callback_resolver {
            Some(resolver) => {
                let ctx = CallbackErrorContext {
                    err,
                    message: query.message.clone(),
                    query: query.clone(),
                };
                match invoke(resolver.resolve(ctx)).await {
                    Ok(fallback) => fallback,
                    Err(failure) => {
                        self.inner
                            .events
                            .emit(&DispatchError::from_resolver_failure(failure));
                        return self.acknowledge(bot, DispatchOutcome::Recovered).await;
                    }
                }
            }
            None => None,
        };

        let delivered = match fallback {
            Some(response) => match response.respond_to_callback_query(&query, &**bot).await {
                Ok(()) => bot.ensure_answered().await,
                Err(e) => Err(e),
            },
            None => bot.ensure_answered().await,
        };

        match delivered {
            Ok(()) => DispatchOutcome::Recovered,
            Err(e) => {
                self.inner.events.emit(&DispatchError::Delivery(e));
                DispatchOutcome::Failed
            }
        }
    }

    /// Issues the empty acknowledgment and reports `outcome`, or `Failed`
    /// if the acknowledgment could not be delivered.
    async fn acknowledge(&self, bot: &AnsweringBot, outcome: DispatchOutcome) -> DispatchOutcome {
        match bot.ensure_answered().await {
            Ok(()) => outcome,
            Err(e) => {
                self.inner.events.emit(&DispatchError::Delivery(e));
                DispatchOutcome::Failed
            }
        }
    }

    // ------------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------------

    async fn resolve_user_data(&self, user_id: UserId) -> Result<Option<UserData<S>>, DispatchError> {
        let Some(store) = &self.inner.store else {
            return Ok(None);
        };
        let record = store.resolve(user_id).await?;
        Ok(Some(UserData::new(user_id, record, Arc::clone(store))))
    }

    async fn lock_user(&self, user_id: UserId) -> Option<OwnedMutexGuard<()>> {
        match &self.inner.user_locks {
            Some(locks) => Some(locks.acquire(user_id).await),
            None => None,
        }
    }
}

impl<S, P> fmt::Debug for Dispatcher<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bot", &self.inner.bot.id())
            .field("commands", &self.inner.commands)
            .field("has_store", &self.inner.store.is_some())
            .field("has_codec", &self.inner.codec.is_some())
            .field("allow_list", &self.inner.allow_list)
            .field("serialize_per_user", &self.inner.user_locks.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Handler invocation
// ============================================================================

/// Why a handler or resolver produced no reply.
enum Failure {
    Error(BoxError),
    Panic(String),
}

impl DispatchError {
    fn from_failure(failure: Failure) -> Self {
        match failure {
            Failure::Error(e) => Self::Handler(e),
            Failure::Panic(msg) => Self::HandlerPanicked(msg),
        }
    }

    fn from_resolver_failure(failure: Failure) -> Self {
        match failure {
            Failure::Error(e) => Self::Resolver(e),
            Failure::Panic(msg) => Self::Resolver(format!("resolver panicked: {msg}").into()),
        }
    }
}

/// Runs a handler future, converting panics into failures.
async fn invoke(fut: BoxFuture<'static, HandlerResult>) -> Result<Reply, Failure> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(e)) => Err(Failure::Error(e)),
        Err(panic) => Err(Failure::Panic(panic_message(&*panic))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for [`Dispatcher`].
///
/// Registration happens only here; the built dispatcher is immutable.
pub struct DispatcherBuilder<S = (), P = ()> {
    bot: BoxedBot,
    commands: Vec<BotCommand>,
    command_handlers: Vec<(String, BoxedMessageHandler<S>)>,
    store: Option<Arc<dyn UserStateStore<S>>>,
    codec: Option<Arc<dyn CallbackCodec<P, S>>>,
    allow_list: AllowList,
    message_resolver: Option<Arc<dyn MessageErrorResolver>>,
    callback_resolver: Option<Arc<dyn CallbackErrorResolver>>,
    events: Option<Arc<ErrorEvents>>,
    serialize_per_user: bool,
}

impl<S, P> DispatcherBuilder<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    pub fn new(bot: BoxedBot) -> Self {
        Self {
            bot,
            commands: Vec::new(),
            command_handlers: Vec::new(),
            store: None,
            codec: None,
            allow_list: AllowList::open(),
            message_resolver: None,
            callback_resolver: None,
            events: None,
            serialize_per_user: false,
        }
    }

    /// Adds an entry to the command table.
    pub fn command(mut self, command: impl Into<String>, description: impl Into<String>) -> Self {
        self.commands.push(BotCommand::new(command, description));
        self
    }

    /// Adds several entries to the command table.
    pub fn commands(mut self, commands: impl IntoIterator<Item = BotCommand>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Binds `handler` to a command of the table. Binding a command twice
    /// keeps the last handler.
    pub fn on_command<H>(mut self, command: impl Into<String>, handler: H) -> Self
    where
        H: MessageHandler<S>,
    {
        self.command_handlers
            .push((command.into(), into_message_handler(handler)));
        self
    }

    /// Binds the user-state store.
    pub fn store(self, store: impl UserStateStore<S>) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Binds a user-state store shared with other owners.
    pub fn shared_store(mut self, store: Arc<dyn UserStateStore<S>>) -> Self {
        self.store = Some(store);
        self
    }

    /// Binds the callback codec.
    pub fn codec(mut self, codec: impl CallbackCodec<P, S>) -> Self {
        self.codec = Some(Arc::new(codec));
        self
    }

    pub fn allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Sets the resolver producing fallback responses for failed messages.
    pub fn on_message_error(mut self, resolver: impl MessageErrorResolver) -> Self {
        self.message_resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets the resolver producing fallback responses for failed callbacks.
    pub fn on_callback_error(mut self, resolver: impl CallbackErrorResolver) -> Self {
        self.callback_resolver = Some(Arc::new(resolver));
        self
    }

    /// Publishes errors on `events` instead of [`ErrorEvents::global`].
    pub fn error_events(mut self, events: Arc<ErrorEvents>) -> Self {
        self.events = Some(events);
        self
    }

    /// Serializes the processing of events from the same user.
    ///
    /// Off by default: events of one user may then interleave between state
    /// resolution and persistence.
    pub fn serialize_per_user(mut self, enabled: bool) -> Self {
        self.serialize_per_user = enabled;
        self
    }

    /// Validates the configuration and builds the dispatcher.
    pub fn build(self) -> Result<Dispatcher<S, P>, BuildError> {
        let mut seen = HashSet::new();
        for cmd in &self.commands {
            if !cmd.command.starts_with('/') {
                return Err(BuildError::InvalidCommand(cmd.command.clone()));
            }
            if !seen.insert(cmd.command.as_str()) {
                return Err(BuildError::DuplicateCommand(cmd.command.clone()));
            }
        }

        let mut command_handlers = HashMap::new();
        for (command, handler) in self.command_handlers {
            if !seen.contains(command.as_str()) {
                return Err(BuildError::UnknownCommand(command));
            }
            command_handlers.insert(command, handler);
        }

        if self.codec.is_none() {
            debug!("No callback codec bound; callback queries will only be acknowledged");
        }

        Ok(Dispatcher {
            inner: Arc::new(DispatcherInner {
                bot: self.bot,
                commands: self.commands,
                command_handlers,
                store: self.store,
                codec: self.codec,
                allow_list: self.allow_list,
                message_resolver: self.message_resolver,
                callback_resolver: self.callback_resolver,
                events: self.events.unwrap_or_else(ErrorEvents::global),
                user_locks: self.serialize_per_user.then(UserLocks::default),
            }),
        })
    }
}

impl<S, P> fmt::Debug for DispatcherBuilder<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("commands", &self.commands)
            .field("command_handler_count", &self.command_handlers.len())
            .field("has_store", &self.store.is_some())
            .field("has_codec", &self.codec.is_some())
            .field("serialize_per_user", &self.serialize_per_user)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::JsonCallbackCodec;
    use crate::error::StateError;
    use crate::state::{JsonUserStateStore, MemoryBackend, StateBackend};
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use switchyard_core::testing::{BotCall, RecordingBot};
    use switchyard_core::{TextResponse, User};

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "state", rename_all = "camelCase")]
    enum Flow {
        #[default]
        Idle,
        AwaitingName,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "camelCase")]
    enum Payload {
        DeleteSet { id: String },
        Page { n: u32 },
    }

    fn alice() -> User {
        User::new(1).with_username("a")
    }

    fn text_from(user: User, text: &str) -> Message {
        Message::new(10, 100).from_user(user).with_text(text)
    }

    fn callback(data: Option<&str>) -> CallbackQuery {
        let query = CallbackQuery::new("q1", alice()).with_message(Message::new(11, 100));
        match data {
            Some(data) => query.with_data(data),
            None => query,
        }
    }

    /// Collects every error emitted on an isolated channel.
    fn capture(events: &ErrorEvents) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        events.subscribe(move |err| sink.lock().push(err.to_string()));
        seen
    }

    async fn start(_ctx: MessageContext<Flow>) -> TextResponse {
        TextResponse::new("welcome")
    }

    async fn ask_name(_ctx: MessageContext<Flow>) -> TextResponse {
        TextResponse::new("what is your name?")
    }

    async fn delete_set(ctx: CallbackContext<Payload, Flow>) -> TextResponse {
        match ctx.data {
            Payload::DeleteSet { id } => TextResponse::new(format!("deleted {id}")),
            Payload::Page { .. } => TextResponse::new("unexpected"),
        }
    }

    async fn boom(_ctx: MessageContext<Flow>) -> Result<TextResponse, std::io::Error> {
        Err(std::io::Error::other("boom"))
    }

    async fn apologize(ctx: MessageErrorContext) -> TextResponse {
        TextResponse::new(format!("sorry: {}", ctx.err))
    }

    fn store_in(state: Flow) -> JsonUserStateStore<Flow> {
        JsonUserStateStore::new(MemoryBackend::new(), move |_| state.clone())
            .on_state("awaitingName", ask_name)
    }

    // ------------------------------------------------------------------------
    // Builder
    // ------------------------------------------------------------------------

    #[test]
    fn test_build_rejects_command_without_slash() {
        let err = Dispatcher::<(), ()>::builder(RecordingBot::shared())
            .command("start", "Start")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidCommand(c) if c == "start"));
    }

    #[test]
    fn test_build_rejects_duplicate_command() {
        let err = Dispatcher::<(), ()>::builder(RecordingBot::shared())
            .command("/start", "Start")
            .command("/start", "Again")
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateCommand(_)));
    }

    #[test]
    fn test_build_rejects_handler_for_unknown_command() {
        let err = Dispatcher::<Flow, ()>::builder(RecordingBot::shared())
            .command("/start", "Start")
            .on_command("/stop", start)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownCommand(c) if c == "/stop"));
    }

    #[tokio::test]
    async fn test_publish_commands_strips_slash() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher = Dispatcher::builder(bot.clone())
            .command("/start", "Start the bot")
            .command("/help", "Show help")
            .build()
            .unwrap();

        dispatcher.publish_commands().await.unwrap();

        assert_eq!(
            bot.calls(),
            vec![BotCall::SetMyCommands(vec![
                BotCommand::new("start", "Start the bot"),
                BotCommand::new("help", "Show help"),
            ])]
        );
    }

    // ------------------------------------------------------------------------
    // Message path
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_command_without_store_delivers_one_reply() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/start", "desc")
            .on_command("/start", start)
            .build()
            .unwrap();

        let outcome = dispatcher
            .handle_message(text_from(alice(), "/start"))
            .await;

        assert_eq!(outcome, DispatchOutcome::Responded);
        assert_eq!(bot.sent_texts(), vec!["welcome"]);
        assert_eq!(bot.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_command_takes_priority_over_state_handler() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/start", "desc")
            .on_command("/start", start)
            .store(store_in(Flow::AwaitingName))
            .build()
            .unwrap();

        dispatcher
            .handle_message(text_from(alice(), "/start"))
            .await;
        dispatcher.handle_message(text_from(alice(), "bob")).await;

        assert_eq!(bot.sent_texts(), vec!["welcome", "what is your name?"]);
    }

    #[tokio::test]
    async fn test_command_in_table_without_handler_falls_through_to_state() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/help", "desc")
            .store(store_in(Flow::AwaitingName))
            .build()
            .unwrap();

        dispatcher.handle_message(text_from(alice(), "/help")).await;
        assert_eq!(bot.sent_texts(), vec!["what is your name?"]);
    }

    #[tokio::test]
    async fn test_unmatched_message_is_dropped() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .store(store_in(Flow::Idle))
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "hi")).await;

        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert!(bot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sender_without_handle_never_reaches_handler() {
        let hits = Arc::new(AtomicUsize::new(0));

        for allow_list in [AllowList::open(), AllowList::only(["a"])] {
            let bot = RecordingBot::shared();
            let counter = Arc::clone(&hits);
            let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
                .command("/start", "desc")
                .on_command("/start", move |_ctx: MessageContext<Flow>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                })
                .allow_list(allow_list)
                .build()
                .unwrap();

            let outcome = dispatcher
                .handle_message(text_from(User::new(7), "/start"))
                .await;
            assert_eq!(outcome, DispatchOutcome::Rejected);

            let no_sender = Message::new(1, 1).with_text("/start");
            assert_eq!(
                dispatcher.handle_message(no_sender).await,
                DispatchOutcome::Rejected
            );
            assert!(bot.calls().is_empty());
        }

        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_allow_list_filters_handles() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/start", "desc")
            .on_command("/start", start)
            .allow_list(AllowList::only(["@a"]))
            .build()
            .unwrap();

        let stranger = User::new(2).with_username("mallory");
        assert_eq!(
            dispatcher
                .handle_message(text_from(stranger, "/start"))
                .await,
            DispatchOutcome::Rejected
        );
        assert_eq!(
            dispatcher.handle_message(text_from(alice(), "/start")).await,
            DispatchOutcome::Responded
        );
        assert_eq!(bot.sent_texts(), vec!["welcome"]);
    }

    #[tokio::test]
    async fn test_handler_without_response() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher = Dispatcher::builder(bot.clone())
            .command("/quiet", "desc")
            .on_command("/quiet", |_ctx: MessageContext<()>| async {})
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "/quiet")).await;
        assert_eq!(outcome, DispatchOutcome::NoResponse);
        assert!(bot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_is_emitted_then_fallback_delivered() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let emitted = Arc::clone(&order);
        events.subscribe(move |err| emitted.lock().push(format!("emit: {err}")));

        let resolved = Arc::clone(&order);
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/fail", "desc")
            .on_command("/fail", boom)
            .on_message_error(move |ctx: MessageErrorContext| {
                resolved.lock().push("resolve".to_string());
                apologize(ctx)
            })
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "/fail")).await;

        assert_eq!(outcome, DispatchOutcome::Recovered);
        assert_eq!(bot.sent_texts(), vec!["sorry: handler failed: boom"]);
        assert_eq!(
            *order.lock(),
            vec!["emit: handler failed: boom".to_string(), "resolve".to_string()]
        );
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        async fn explode(_ctx: MessageContext<()>) {
            panic!("handler exploded")
        }

        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);

        let dispatcher: Dispatcher = Dispatcher::builder(bot.clone())
            .command("/panic", "desc")
            .on_command("/panic", explode)
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "/panic")).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(*seen.lock(), vec!["handler panicked: handler exploded"]);
    }

    #[tokio::test]
    async fn test_delivery_failure_enters_recovery() {
        let bot = RecordingBot::shared();
        bot.set_fail_sends(true);
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);

        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/start", "desc")
            .on_command("/start", start)
            .on_message_error(apologize)
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "/start")).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.starts_with("failed to deliver response")));
    }

    #[tokio::test]
    async fn test_failing_resolver_emits_secondary_error() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);

        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/fail", "desc")
            .on_command("/fail", boom)
            .on_message_error(|_ctx: MessageErrorContext| async {
                Err::<TextResponse, _>("resolver down")
            })
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "/fail")).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(
            *seen.lock(),
            vec![
                "handler failed: boom".to_string(),
                "error resolver failed: resolver down".to_string()
            ]
        );
        assert!(bot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_reported() {
        let backend = MemoryBackend::new();
        backend
            .save(1, serde_json::json!({ "state": "gone" }))
            .await
            .unwrap();
        let store: JsonUserStateStore<Flow> =
            JsonUserStateStore::new(backend, |_| Flow::Idle).on_state("awaitingName", ask_name);

        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(RecordingBot::shared())
            .store(store)
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_message(text_from(alice(), "hi")).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert!(seen.lock()[0].contains("corrupt"));
    }

    #[tokio::test]
    async fn test_handler_state_update_drives_next_message() {
        let bot = RecordingBot::shared();

        async fn begin(ctx: MessageContext<Flow>) -> Result<TextResponse, StateError> {
            let Some(mut data) = ctx.user_data else {
                return Ok(TextResponse::new("no state"));
            };
            data.update(Flow::AwaitingName).await?;
            Ok(TextResponse::new("name?"))
        }

        let dispatcher: Dispatcher<Flow> = Dispatcher::builder(bot.clone())
            .command("/begin", "desc")
            .on_command("/begin", begin)
            .store(store_in(Flow::Idle))
            .build()
            .unwrap();

        assert_eq!(
            dispatcher.handle_message(text_from(alice(), "bob")).await,
            DispatchOutcome::Dropped
        );
        dispatcher.handle_message(text_from(alice(), "/begin")).await;
        dispatcher.handle_message(text_from(alice(), "bob")).await;

        assert_eq!(bot.sent_texts(), vec!["name?", "what is your name?"]);
    }

    #[tokio::test]
    async fn test_serialize_per_user_orders_same_user_events() {
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        struct Tally {
            count: u32,
        }

        let bot = RecordingBot::shared();
        let store: JsonUserStateStore<Tally> = JsonUserStateStore::in_memory();
        let store: Arc<dyn UserStateStore<Tally>> = Arc::new(store);

        let dispatcher: Dispatcher<Tally> = Dispatcher::builder(bot.clone())
            .command("/inc", "desc")
            .on_command("/inc", |ctx: MessageContext<Tally>| async move {
                let mut data = ctx.user_data.ok_or("no state")?;
                let next = data.record().count + 1;
                tokio::time::sleep(Duration::from_millis(10)).await;
                data.record_mut().count = next;
                data.persist().await?;
                Ok::<_, BoxError>(())
            })
            .shared_store(Arc::clone(&store))
            .serialize_per_user(true)
            .build()
            .unwrap();

        tokio::join!(
            dispatcher.handle_message(text_from(alice(), "/inc")),
            dispatcher.handle_message(text_from(alice(), "/inc")),
        );

        assert_eq!(store.resolve(1).await.unwrap().count, 2);
    }

    // ------------------------------------------------------------------------
    // Callback path
    // ------------------------------------------------------------------------

    fn codec() -> JsonCallbackCodec<Payload, Flow> {
        JsonCallbackCodec::new().on("deleteSet", delete_set)
    }

    #[tokio::test]
    async fn test_callback_response_without_bare_acknowledgment() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(codec())
            .build()
            .unwrap();

        let data = codec()
            .encode(&Payload::DeleteSet { id: "42".into() })
            .unwrap();
        let outcome = dispatcher
            .handle_callback_query(callback(Some(&data)))
            .await;

        assert_eq!(outcome, DispatchOutcome::Responded);
        assert_eq!(bot.answer_count(), 1);
        assert_eq!(bot.sent_texts(), vec!["deleted 42"]);
    }

    #[tokio::test]
    async fn test_callback_with_state_store_resolves_record() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .store(store_in(Flow::AwaitingName))
            .codec(JsonCallbackCodec::new().on(
                "page",
                |ctx: CallbackContext<Payload, Flow>| async move {
                    let state = ctx.user_data.map(|d| d.into_record());
                    TextResponse::new(format!("{state:?}"))
                },
            ))
            .build()
            .unwrap();

        dispatcher
            .handle_callback_query(callback(Some(r#"{"type":"page","n":2}"#)))
            .await;

        assert_eq!(bot.sent_texts(), vec!["Some(AwaitingName)"]);
    }

    #[tokio::test]
    async fn test_callback_without_data_is_unsupported_and_still_acknowledged() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(codec())
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_callback_query(callback(None)).await;

        assert_eq!(outcome, DispatchOutcome::Recovered);
        assert_eq!(*seen.lock(), vec!["unsupported callback data: <none>"]);
        assert_eq!(
            bot.calls(),
            vec![BotCall::AnswerCallbackQuery {
                query_id: "q1".into(),
                text: None
            }]
        );
    }

    #[tokio::test]
    async fn test_unhandled_payload_goes_to_callback_resolver() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(codec())
            .on_callback_error(|ctx: CallbackErrorContext| async move {
                assert!(ctx.err.is_unsupported_callback());
                TextResponse::new("that button is gone").notice("expired")
            })
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher
            .handle_callback_query(callback(Some(r#"{"type":"page","n":1}"#)))
            .await;

        assert_eq!(outcome, DispatchOutcome::Recovered);
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bot.answer_count(), 1);
        assert_eq!(bot.sent_texts(), vec!["that button is gone"]);
    }

    #[tokio::test]
    async fn test_undecodable_data_is_acknowledged_not_escalated() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(codec())
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher
            .handle_callback_query(callback(Some("stale-token")))
            .await;

        assert_eq!(outcome, DispatchOutcome::Acknowledged);
        assert!(seen.lock().is_empty());
        assert_eq!(bot.answer_count(), 1);
    }

    #[tokio::test]
    async fn test_callback_without_codec_is_acknowledged() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher = Dispatcher::builder(bot.clone()).build().unwrap();

        let outcome = dispatcher
            .handle_callback_query(callback(Some("anything")))
            .await;

        assert_eq!(outcome, DispatchOutcome::Unconfigured);
        assert_eq!(bot.answer_count(), 1);
    }

    #[tokio::test]
    async fn test_callback_without_message_or_not_allowed_is_acknowledged() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(codec())
            .allow_list(AllowList::only(["someone-else"]))
            .build()
            .unwrap();

        let detached = CallbackQuery::new("q0", alice()).with_data("{}");
        assert_eq!(
            dispatcher.handle_callback_query(detached).await,
            DispatchOutcome::Acknowledged
        );
        assert_eq!(
            dispatcher
                .handle_callback_query(callback(Some(r#"{"type":"deleteSet","id":"1"}"#)))
                .await,
            DispatchOutcome::Rejected
        );

        assert_eq!(bot.answer_count(), 2);
        assert!(bot.sent_texts().is_empty());
    }

    #[tokio::test]
    async fn test_callback_handler_answering_itself_is_not_answered_twice() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(JsonCallbackCodec::new().on(
                "deleteSet",
                |ctx: CallbackContext<Payload, Flow>| async move {
                    ctx.bot
                        .answer_callback_query(
                            &ctx.query.id,
                            &switchyard_core::CallbackAnswer::notice("working"),
                        )
                        .await?;
                    Ok::<_, BoxError>(TextResponse::new("done"))
                },
            ))
            .build()
            .unwrap();

        let outcome = dispatcher
            .handle_callback_query(callback(Some(r#"{"type":"deleteSet","id":"1"}"#)))
            .await;

        assert_eq!(outcome, DispatchOutcome::Responded);
        assert_eq!(bot.answer_count(), 1);
        assert_eq!(bot.sent_texts(), vec!["done"]);
    }

    async fn stale_set(_ctx: CallbackContext<Payload, Flow>) -> Result<TextResponse, std::io::Error> {
        Err(std::io::Error::other("set is gone"))
    }

    fn failing_codec() -> JsonCallbackCodec<Payload, Flow> {
        JsonCallbackCodec::new().on("deleteSet", stale_set)
    }

    const DELETE_ONE: &str = r#"{"type":"deleteSet","id":"1"}"#;

    #[tokio::test]
    async fn test_callback_handler_error_delivers_resolver_fallback() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(failing_codec())
            .on_callback_error(|ctx: CallbackErrorContext| async move {
                TextResponse::new(format!("could not do that: {}", ctx.err)).notice("failed")
            })
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_callback_query(callback(Some(DELETE_ONE))).await;

        assert_eq!(outcome, DispatchOutcome::Recovered);
        assert_eq!(*seen.lock(), vec!["handler failed: set is gone"]);
        assert_eq!(
            bot.calls()
                .into_iter()
                .filter(|call| matches!(call, BotCall::AnswerCallbackQuery { .. }))
                .collect::<Vec<_>>(),
            vec![BotCall::AnswerCallbackQuery {
                query_id: "q1".into(),
                text: Some("failed".into())
            }]
        );
        assert_eq!(
            bot.sent_texts(),
            vec!["could not do that: handler failed: set is gone"]
        );
    }

    #[tokio::test]
    async fn test_failing_callback_resolver_still_acknowledges_once() {
        let bot = RecordingBot::shared();
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(failing_codec())
            .on_callback_error(|_ctx: CallbackErrorContext| async {
                Err::<TextResponse, _>("resolver down")
            })
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_callback_query(callback(Some(DELETE_ONE))).await;

        assert_eq!(outcome, DispatchOutcome::Recovered);
        assert_eq!(
            *seen.lock(),
            vec![
                "handler failed: set is gone".to_string(),
                "error resolver failed: resolver down".to_string()
            ]
        );
        assert_eq!(
            bot.calls(),
            vec![BotCall::AnswerCallbackQuery {
                query_id: "q1".into(),
                text: None
            }]
        );
    }

    #[tokio::test]
    async fn test_failing_callback_resolver_and_answer_is_failed() {
        let bot = RecordingBot::shared();
        bot.set_fail_answers(true);
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(failing_codec())
            .on_callback_error(|_ctx: CallbackErrorContext| async {
                Err::<TextResponse, _>("resolver down")
            })
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_callback_query(callback(Some(DELETE_ONE))).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen[2].starts_with("failed to deliver response"));
        assert!(bot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_callback_answer_failure_is_delivery_error() {
        let bot = RecordingBot::shared();
        bot.set_fail_answers(true);
        let events = Arc::new(ErrorEvents::new());
        let seen = capture(&events);
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .codec(codec())
            .error_events(events)
            .build()
            .unwrap();

        let outcome = dispatcher.handle_callback_query(callback(Some(DELETE_ONE))).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.starts_with("failed to deliver response")));
        assert!(bot.calls().is_empty());
    }

    #[tokio::test]
    async fn test_callback_every_path_answers_exactly_once() {
        let inputs = [
            None,
            Some("garbage"),
            Some(r#"{"type":"page","n":1}"#),
            Some(r#"{"type":"deleteSet","id":"9"}"#),
        ];

        for data in inputs {
            let bot = RecordingBot::shared();
            let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
                .codec(codec())
                .error_events(Arc::new(ErrorEvents::new()))
                .build()
                .unwrap();

            dispatcher.handle_callback_query(callback(data)).await;
            assert_eq!(bot.answer_count(), 1, "data: {data:?}");
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_update_kind() {
        let bot = RecordingBot::shared();
        let dispatcher: Dispatcher<Flow, Payload> = Dispatcher::builder(bot.clone())
            .command("/start", "desc")
            .on_command("/start", start)
            .codec(codec())
            .build()
            .unwrap();

        let message = dispatcher
            .dispatch(Update::from(text_from(alice(), "/start")))
            .await;
        let query = dispatcher
            .dispatch(Update::from(callback(Some(r#"{"type":"deleteSet","id":"3"}"#))))
            .await;

        assert_eq!(message, DispatchOutcome::Responded);
        assert_eq!(query, DispatchOutcome::Responded);
        assert_eq!(bot.sent_texts(), vec!["welcome", "deleted 3"]);
    }
}

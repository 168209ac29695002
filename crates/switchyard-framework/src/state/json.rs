//! The JSON-backed [`UserStateStore`] implementation.
//!
//! Records round-trip through `serde_json::Value`, so any backend that can
//! store one JSON document per user can hold them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use switchyard_core::UserId;
use tracing::{debug, trace};

use super::backend::{MemoryBackend, StateBackend};
use super::UserStateStore;
use crate::error::{StateError, StateResult};
use crate::handler::{BoxedMessageHandler, MessageHandler, into_message_handler};

/// Default name of the field carrying the state tag.
pub const DEFAULT_STATE_TAG_FIELD: &str = "state";

type InitialRecordFn<S> = Arc<dyn Fn(UserId) -> S + Send + Sync>;

/// A user-state store for serde-serializable records.
///
/// The state tag of a record is read from its JSON rendering: the value of
/// the tag field (default `"state"`) for objects, or the string itself for
/// records that serialize to a bare string (unit enum variants). This makes
/// internally tagged enums the natural record type:
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(tag = "state", rename_all = "camelCase")]
/// enum State {
///     Idle,
///     AwaitingName { attempts: u32 },
/// }
///
/// let store = JsonUserStateStore::new(MemoryBackend::new(), |_| State::Idle)
///     .on_state("awaitingName", receive_name);
/// ```
///
/// Handlers are registered while building the store and never change
/// afterwards; registering a tag twice keeps the last handler.
pub struct JsonUserStateStore<S, B = MemoryBackend> {
    backend: B,
    initial: InitialRecordFn<S>,
    tag_field: String,
    handlers: HashMap<String, BoxedMessageHandler<S>>,
}

impl<S> JsonUserStateStore<S, MemoryBackend>
where
    S: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// An in-memory store whose new users start at `S::default()`.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), |_| S::default())
    }
}

impl<S, B> JsonUserStateStore<S, B>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: StateBackend,
{
    /// Creates a store over `backend`; `initial` builds the record of a
    /// user seen for the first time.
    pub fn new<F>(backend: B, initial: F) -> Self
    where
        F: Fn(UserId) -> S + Send + Sync + 'static,
    {
        Self {
            backend,
            initial: Arc::new(initial),
            tag_field: DEFAULT_STATE_TAG_FIELD.to_string(),
            handlers: HashMap::new(),
        }
    }

    /// Overrides the name of the field carrying the state tag.
    pub fn tag_field(mut self, field: impl Into<String>) -> Self {
        self.tag_field = field.into();
        self
    }

    /// Registers `handler` for one state tag.
    pub fn on_state<H>(mut self, tag: impl Into<String>, handler: H) -> Self
    where
        H: MessageHandler<S>,
    {
        self.handlers.insert(tag.into(), into_message_handler(handler));
        self
    }

    /// Registers one `handler` for several state tags.
    pub fn on_states<I, T, H>(mut self, tags: I, handler: H) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
        H: MessageHandler<S>,
    {
        let handler = into_message_handler(handler);
        for tag in tags {
            self.handlers.insert(tag.into(), Arc::clone(&handler));
        }
        self
    }

    /// Returns the state tag of `record`, if it has one.
    pub fn state_tag(&self, record: &S) -> Option<String> {
        match serde_json::to_value(record).ok()? {
            Value::String(tag) => Some(tag),
            Value::Object(mut map) => match map.remove(&self.tag_field)? {
                Value::String(tag) => Some(tag),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the registered state tags.
    pub fn registered_tags(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<S, B> UserStateStore<S> for JsonUserStateStore<S, B>
where
    S: Serialize + DeserializeOwned + Send + Sync + 'static,
    B: StateBackend,
{
    async fn resolve(&self, user_id: UserId) -> StateResult<S> {
        if let Some(value) = self.backend.load(user_id).await? {
            return serde_json::from_value(value)
                .map_err(|source| StateError::Corrupt { user_id, source });
        }

        let record = (self.initial)(user_id);
        self.persist(user_id, &record).await?;
        debug!(user_id, "Created initial user state");
        Ok(record)
    }

    async fn persist(&self, user_id: UserId, record: &S) -> StateResult<()> {
        let value = serde_json::to_value(record)
            .map_err(|source| StateError::Serialize { user_id, source })?;
        self.backend.save(user_id, value).await
    }

    fn lookup_handler(&self, record: &S) -> Option<BoxedMessageHandler<S>> {
        let tag = self.state_tag(record)?;
        let handler = self.handlers.get(&tag).cloned();
        trace!(tag = %tag, found = handler.is_some(), "State handler lookup");
        handler
    }
}

impl<S, B: fmt::Debug> fmt::Debug for JsonUserStateStore<S, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonUserStateStore")
            .field("backend", &self.backend)
            .field("tag_field", &self.tag_field)
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MessageContext;
    use serde::Deserialize;
    use serde_json::json;
    use switchyard_core::TextResponse;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "state", rename_all = "camelCase")]
    enum Flow {
        #[default]
        Idle,
        AwaitingName {
            attempts: u32,
        },
        AwaitingAge,
    }

    async fn ask_again(_ctx: MessageContext<Flow>) -> TextResponse {
        TextResponse::new("again")
    }

    async fn other(_ctx: MessageContext<Flow>) {}

    #[tokio::test]
    async fn test_resolve_creates_exactly_one_record() {
        let store: JsonUserStateStore<Flow> = JsonUserStateStore::in_memory();

        assert_eq!(store.resolve(1).await.unwrap(), Flow::Idle);
        assert_eq!(store.backend().len(), 1);

        assert_eq!(store.resolve(1).await.unwrap(), Flow::Idle);
        assert_eq!(store.backend().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_returns_last_persisted() {
        let store: JsonUserStateStore<Flow> = JsonUserStateStore::in_memory();
        store.resolve(1).await.unwrap();

        store
            .persist(1, &Flow::AwaitingName { attempts: 2 })
            .await
            .unwrap();

        assert_eq!(
            store.resolve(1).await.unwrap(),
            Flow::AwaitingName { attempts: 2 }
        );
        assert_eq!(
            store.backend().get(1),
            Some(json!({ "state": "awaitingName", "attempts": 2 }))
        );
    }

    #[tokio::test]
    async fn test_initial_record_factory_receives_user_id() {
        let store = JsonUserStateStore::new(MemoryBackend::new(), |id| {
            if id == 42 { Flow::AwaitingAge } else { Flow::Idle }
        });
        assert_eq!(store.resolve(42).await.unwrap(), Flow::AwaitingAge);
        assert_eq!(store.resolve(1).await.unwrap(), Flow::Idle);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let backend = MemoryBackend::new();
        backend.save(5, json!({ "state": "unknownTag" })).await.unwrap();
        let store: JsonUserStateStore<Flow> = JsonUserStateStore::new(backend, |_| Flow::Idle);

        let err = store.resolve(5).await.unwrap_err();
        assert!(matches!(err, StateError::Corrupt { user_id: 5, .. }));
    }

    #[test]
    fn test_lookup_is_total_and_last_registration_wins() {
        let store: JsonUserStateStore<Flow> = JsonUserStateStore::in_memory()
            .on_state("awaitingName", other)
            .on_state("awaitingName", ask_again);

        assert!(store.lookup_handler(&Flow::Idle).is_none());
        assert!(
            store
                .lookup_handler(&Flow::AwaitingName { attempts: 0 })
                .is_some()
        );
        assert_eq!(store.registered_tags().count(), 1);
    }

    #[test]
    fn test_on_states_shares_one_handler() {
        let store: JsonUserStateStore<Flow> =
            JsonUserStateStore::in_memory().on_states(["awaitingName", "awaitingAge"], other);

        let a = store
            .lookup_handler(&Flow::AwaitingName { attempts: 1 })
            .unwrap();
        let b = store.lookup_handler(&Flow::AwaitingAge).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_bare_string_records_use_value_as_tag() {
        #[derive(Serialize, Deserialize)]
        enum Plain {
            Waiting,
        }

        let store: JsonUserStateStore<Plain> =
            JsonUserStateStore::new(MemoryBackend::new(), |_| Plain::Waiting);
        assert_eq!(store.state_tag(&Plain::Waiting).as_deref(), Some("Waiting"));
    }

    #[test]
    fn test_custom_tag_field() {
        #[derive(Serialize, Deserialize)]
        #[serde(tag = "step")]
        enum Wizard {
            One,
        }

        let store: JsonUserStateStore<Wizard> =
            JsonUserStateStore::new(MemoryBackend::new(), |_| Wizard::One).tag_field("step");
        assert_eq!(store.state_tag(&Wizard::One).as_deref(), Some("One"));
    }
}

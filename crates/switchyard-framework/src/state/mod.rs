//! Per-user persisted state.
//!
//! A [`UserStateStore`] produces the state record of a user (creating it on
//! first contact), persists updates to it, and owns the registry of handlers
//! keyed by the record's current state tag. The dispatcher consults it for
//! every message whose text is not a registered command.
//!
//! [`JsonUserStateStore`] is the reference implementation: records are stored
//! as JSON values through a [`StateBackend`], and the state tag is read from
//! the record's JSON rendering.

mod backend;
mod json;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use switchyard_core::UserId;

use crate::error::StateResult;
use crate::handler::BoxedMessageHandler;

pub use backend::{FileBackend, MemoryBackend, StateBackend};
pub use json::{DEFAULT_STATE_TAG_FIELD, JsonUserStateStore};

/// Resolves, persists and routes per-user state records.
///
/// Implementations are shared by every in-flight event and must be safe for
/// concurrent use. No locking is performed around `resolve`/`persist`; two
/// events of the same user may interleave unless the dispatcher is built
/// with per-user serialization.
#[async_trait]
pub trait UserStateStore<S>: Send + Sync + 'static {
    /// Returns the user's record, creating and persisting it if absent.
    async fn resolve(&self, user_id: UserId) -> StateResult<S>;

    /// Stores `record` as the user's current record.
    async fn persist(&self, user_id: UserId, record: &S) -> StateResult<()>;

    /// Returns the handler registered for the record's current state tag.
    ///
    /// Total: an unregistered tag yields `None`.
    fn lookup_handler(&self, record: &S) -> Option<BoxedMessageHandler<S>>;
}

// ============================================================================
// UserData
// ============================================================================

/// A user's state record, borrowed read/write for one handler invocation.
///
/// Changes are local until [`persist`](Self::persist) is called.
pub struct UserData<S> {
    user_id: UserId,
    record: S,
    store: Arc<dyn UserStateStore<S>>,
}

impl<S: Send + Sync + 'static> UserData<S> {
    pub fn new(user_id: UserId, record: S, store: Arc<dyn UserStateStore<S>>) -> Self {
        Self {
            user_id,
            record,
            store,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn record(&self) -> &S {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut S {
        &mut self.record
    }

    /// Replaces the record without persisting it.
    pub fn set(&mut self, record: S) {
        self.record = record;
    }

    pub fn into_record(self) -> S {
        self.record
    }

    /// Writes the current record back to the store.
    pub async fn persist(&self) -> StateResult<()> {
        self.store.persist(self.user_id, &self.record).await
    }

    /// Replaces the record and persists it.
    pub async fn update(&mut self, record: S) -> StateResult<()> {
        self.record = record;
        self.persist().await
    }
}

impl<S: fmt::Debug> fmt::Debug for UserData<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserData")
            .field("user_id", &self.user_id)
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

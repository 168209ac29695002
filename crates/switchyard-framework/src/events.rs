//! The "response error" notification channel.
//!
//! Every failure observed by the dispatcher's error-recovery protocol is
//! emitted here. When at least one listener is subscribed, all listeners are
//! notified; otherwise the error is logged at `error` level so that no
//! failure is ever dropped silently.
//!
//! ```rust,ignore
//! ErrorEvents::global().subscribe(|err| {
//!     metrics::counter!("dispatch_errors").increment(1);
//!     eprintln!("dispatch failed: {err}");
//! });
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::error;

use crate::error::DispatchError;

/// Name of the notification, as it appears in logs.
pub const RESPONSE_ERROR_EVENT: &str = "response error";

/// A subscribed error listener.
pub type ErrorListener = Arc<dyn Fn(&DispatchError) + Send + Sync>;

/// Handle returned by [`ErrorEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A pub/sub channel for dispatch errors with a logging fallback.
#[derive(Default)]
pub struct ErrorEvents {
    listeners: RwLock<Vec<(ListenerId, ErrorListener)>>,
    next_id: AtomicU64,
}

static GLOBAL: OnceLock<Arc<ErrorEvents>> = OnceLock::new();

impl ErrorEvents {
    /// Creates an isolated channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide channel used by dispatchers unless overridden.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Subscribes a listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DispatchError) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener; returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Notifies every listener, or logs the error when there are none.
    ///
    /// Listeners are called outside the lock and may subscribe or
    /// unsubscribe from within the callback.
    pub fn emit(&self, err: &DispatchError) {
        let listeners: Vec<ErrorListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        if listeners.is_empty() {
            error!(event = RESPONSE_ERROR_EVENT, error = %err, "Unobserved dispatch error");
            return;
        }

        for listener in listeners {
            listener(err);
        }
    }
}

impl fmt::Debug for ErrorEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorEvents")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

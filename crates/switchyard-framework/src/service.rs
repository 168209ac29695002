//! Tower integration.
//!
//! [`Dispatcher`] implements `tower::Service<Update>`, so cross-cutting
//! concerns (timeouts, concurrency limits, load shedding) are expressed as
//! ordinary tower layers stacked on top of it:
//!
//! ```rust,ignore
//! let svc = ServiceBuilder::new()
//!     .concurrency_limit(64)
//!     .service(dispatcher);
//! let runtime = Runtime::with_service(svc);
//! ```
//!
//! The service never fails: the error type is [`Infallible`] because the
//! dispatcher contains every error itself.

use std::convert::Infallible;
use std::task::{Context, Poll};

use switchyard_core::Update;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::handler::BoxFuture;

/// A type-erased, `Clone + Send + Sync` dispatch service.
pub type BoxedDispatchService = BoxCloneSyncService<Update, DispatchOutcome, Infallible>;

impl<S, P> Service<Update> for Dispatcher<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    type Response = DispatchOutcome;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<DispatchOutcome, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, update: Update) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(update).await) })
    }
}

impl<S, P> Dispatcher<S, P>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Erases the dispatcher's type parameters.
    pub fn into_service(self) -> BoxedDispatchService {
        BoxCloneSyncService::new(self)
    }
}

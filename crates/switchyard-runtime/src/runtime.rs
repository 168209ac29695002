//! Update pump.
//!
//! The runtime pulls [`Update`]s from an [`UpdateSource`], spawns one task per
//! update onto a [`TaskTracker`], and drives each through the dispatch
//! service. Events are processed concurrently; nothing orders two updates
//! against each other unless the dispatcher was built with per-user
//! serialization.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use switchyard_runtime::Runtime;
//!
//! let (tx, rx) = tokio::sync::mpsc::channel(64);
//! // hand `tx` to the transport...
//! Runtime::new(dispatcher).run(rx).await?;
//! ```
//!
//! # Middleware
//!
//! ```rust,ignore
//! let svc = ServiceBuilder::new()
//!     .timeout(Duration::from_secs(30))
//!     .service(dispatcher);
//! Runtime::with_service(svc).run(rx).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use switchyard_core::{ApiResult, BoxError, Update};
use switchyard_framework::{DispatchOutcome, Dispatcher};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// The dispatch service driven by the runtime.
pub type RuntimeService = BoxCloneSyncService<Update, DispatchOutcome, BoxError>;

type BoxFuture<'a, T> = std::pin::Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type CommandPublisher = Box<dyn Fn() -> BoxFuture<'static, ApiResult<()>> + Send + Sync>;

// =============================================================================
// UpdateSource
// =============================================================================

/// A source of inbound updates, typically fed by a transport.
///
/// Returning `None` means the source is exhausted and the runtime stops.
#[async_trait]
pub trait UpdateSource: Send {
    async fn next_update(&mut self) -> Option<Update>;
}

#[async_trait]
impl UpdateSource for mpsc::Receiver<Update> {
    async fn next_update(&mut self) -> Option<Update> {
        self.recv().await
    }
}

#[async_trait]
impl UpdateSource for mpsc::UnboundedReceiver<Update> {
    async fn next_update(&mut self) -> Option<Update> {
        self.recv().await
    }
}

/// Adapts any `Stream` of updates into an [`UpdateSource`].
pub struct StreamSource<St>(pub St);

#[async_trait]
impl<St> UpdateSource for StreamSource<St>
where
    St: Stream<Item = Update> + Send + Unpin,
{
    async fn next_update(&mut self) -> Option<Update> {
        self.0.next().await
    }
}

// =============================================================================
// RuntimeStats
// =============================================================================

/// Counters maintained by the runtime.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    received: AtomicU64,
    completed: AtomicU64,
    errored: AtomicU64,
}

impl RuntimeStats {
    /// Updates pulled from the source.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Updates whose dispatch has finished, successfully or not.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Updates whose handling raised an error, recovered or not.
    pub fn errored(&self) -> u64 {
        self.errored.load(Ordering::Relaxed)
    }

    fn record(&self, failed: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.errored.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Drives a dispatch service with updates from a source.
pub struct Runtime {
    service: RuntimeService,
    publisher: Option<CommandPublisher>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    stats: Arc<RuntimeStats>,
}

impl Runtime {
    /// Creates a runtime around `dispatcher`.
    ///
    /// The dispatcher's command table is published when the runtime starts;
    /// see [`publish_commands`](Self::publish_commands).
    pub fn new<S, P>(dispatcher: Dispatcher<S, P>) -> Self
    where
        S: Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let publisher = dispatcher.clone();
        let mut runtime = Self::with_service(dispatcher);
        runtime.publisher = Some(Box::new(move || {
            let dispatcher = publisher.clone();
            let fut: BoxFuture<'static, ApiResult<()>> =
                Box::pin(async move { dispatcher.publish_commands().await });
            fut
        }));
        runtime
    }

    /// Creates a runtime around an arbitrary dispatch service, such as a
    /// dispatcher wrapped in tower middleware. No command table is published.
    pub fn with_service<Svc>(service: Svc) -> Self
    where
        Svc: Service<Update, Response = DispatchOutcome> + Clone + Send + Sync + 'static,
        Svc::Error: Into<BoxError>,
        Svc::Future: Send + 'static,
    {
        Self {
            service: BoxCloneSyncService::new(service.map_err(Into::into)),
            publisher: None,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            stats: Arc::new(RuntimeStats::default()),
        }
    }

    /// Enables or disables publishing the command table on start.
    pub fn publish_commands(mut self, enabled: bool) -> Self {
        if !enabled {
            self.publisher = None;
        }
        self
    }

    pub fn stats(&self) -> &Arc<RuntimeStats> {
        &self.stats
    }

    /// Number of dispatch tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// A token that stops the runtime when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requests a stop. In-flight updates still run to completion; a
    /// cancelled runtime cannot be run again.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs until the source is exhausted or Ctrl+C / SIGTERM is received.
    pub async fn run<U>(&self, source: U) -> RuntimeResult<()>
    where
        U: UpdateSource,
    {
        let signal = ShutdownSignal::install()?;
        info!("Switchyard runtime is now running. Press Ctrl+C to stop.");
        self.run_until(source, signal.recv()).await
    }

    /// Runs until the source is exhausted, `shutdown` completes, or the
    /// shutdown token is cancelled. Waits for in-flight updates before
    /// returning.
    pub async fn run_until<U, F>(&self, mut source: U, shutdown: F) -> RuntimeResult<()>
    where
        U: UpdateSource,
        F: Future<Output = ()>,
    {
        if let Some(publish) = &self.publisher {
            publish().await?;
            info!("Command table published");
        }

        self.tracker.reopen();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown token cancelled");
                    break;
                }
                update = source.next_update() => match update {
                    Some(update) => self.spawn_dispatch(update),
                    None => {
                        info!("Update source exhausted");
                        break;
                    }
                },
            }
        }

        self.tracker.close();
        if !self.tracker.is_empty() {
            debug!(in_flight = self.tracker.len(), "Waiting for in-flight updates");
        }
        self.tracker.wait().await;

        info!(
            received = self.stats.received(),
            errored = self.stats.errored(),
            "Runtime stopped"
        );
        Ok(())
    }

    fn spawn_dispatch(&self, update: Update) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        let service = self.service.clone();
        let stats = Arc::clone(&self.stats);

        self.tracker.spawn(async move {
            match service.oneshot(update).await {
                Ok(outcome) => {
                    debug!(?outcome, "Update dispatched");
                    stats.record(outcome.is_error());
                }
                Err(e) => {
                    error!(error = %e, "Dispatch service failed");
                    stats.record(true);
                }
            }
        });
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("publishes_commands", &self.publisher.is_some())
            .field("in_flight", &self.tracker.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Shutdown signal
// =============================================================================

/// Ctrl+C and, on Unix, SIGTERM.
struct ShutdownSignal {
    #[cfg(unix)]
    sigterm: signal::unix::Signal,
}

impl ShutdownSignal {
    fn install() -> RuntimeResult<Self> {
        Ok(Self {
            #[cfg(unix)]
            sigterm: signal::unix::signal(signal::unix::SignalKind::terminate())
                .map_err(RuntimeError::Signal)?,
        })
    }

    async fn recv(self) {
        #[cfg(unix)]
        {
            let mut sigterm = self.sigterm;
            tokio::select! {
                _ = ctrl_c() => info!("Received Ctrl+C, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c().await;
            info!("Received Ctrl+C, shutting down");
        }
    }
}

/// Completes on Ctrl+C; never completes if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

//! Pluggable services started alongside the sequencer.
//!
//! A collaborator gets a [`ControlHandle`] and the table store once the
//! sequencer is up, and is stopped before it. Two are built in:
//!
//! - [`StorageHealthCheck`] pings the table store and reports when it stays
//!   unreachable.
//! - [`DebugStateReporter`] logs the sequencer's debug state periodically.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ephemeris_state::TableStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ControlResult;
use crate::handle::ControlHandle;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// What a collaborator receives when it starts.
#[derive(Clone)]
pub struct CollaboratorContext {
    pub handle: ControlHandle,
    pub store: Arc<dyn TableStore>,
    /// Cancelled when the server stops.
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Unique among the server's collaborators.
    fn name(&self) -> &'static str;

    async fn start(&mut self, ctx: CollaboratorContext) -> ControlResult<()>;

    async fn stop(&mut self);
}

/// Cancellable background loop owned by a collaborator.
struct Periodic {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl Periodic {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "periodic task ended abnormally");
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PingFailure {
    Retrying(u32),
    Down(u32),
    StillDown,
}

/// Consecutive ping failures against a threshold.
struct FailureCount {
    consecutive: u32,
    threshold: u32,
}

impl FailureCount {
    fn new(threshold: u32) -> Self {
        Self {
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    fn fail(&mut self) -> PingFailure {
        self.consecutive = self.consecutive.saturating_add(1);
        match self.consecutive.cmp(&self.threshold) {
            std::cmp::Ordering::Less => PingFailure::Retrying(self.consecutive),
            std::cmp::Ordering::Equal => PingFailure::Down(self.consecutive),
            std::cmp::Ordering::Greater => PingFailure::StillDown,
        }
    }

    /// Resets the count. True if the store had been reported down.
    fn recover(&mut self) -> bool {
        let was_down = self.consecutive >= self.threshold;
        self.consecutive = 0;
        was_down
    }
}

/// Pings the table store every `interval`.
pub struct StorageHealthCheck {
    interval: Duration,
    failure_threshold: u32,
    healthy: Arc<AtomicBool>,
    task: Option<Periodic>,
}

impl StorageHealthCheck {
    #[must_use]
    pub fn new(interval: Duration, failure_threshold: u32) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            failure_threshold: failure_threshold.max(1),
            healthy: Arc::new(AtomicBool::new(true)),
            task: None,
        }
    }

    /// False once `failure_threshold` consecutive pings have failed, until
    /// the next successful one.
    pub fn health(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.healthy)
    }
}

#[async_trait]
impl Collaborator for StorageHealthCheck {
    fn name(&self) -> &'static str {
        "storage-health-check"
    }

    async fn start(&mut self, ctx: CollaboratorContext) -> ControlResult<()> {
        let cancel = ctx.cancel.child_token();
        let token = cancel.clone();
        let interval = self.interval;
        let threshold = self.failure_threshold;
        let healthy = Arc::clone(&self.healthy);
        let store = ctx.store;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut failures = FailureCount::new(threshold);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match store.ping().await {
                    Ok(()) => {
                        if failures.recover() {
                            info!(backend = %store.backend(), "table store reachable again");
                        }
                        healthy.store(true, Ordering::Relaxed);
                    }
                    Err(e) => match failures.fail() {
                        PingFailure::Retrying(n) => {
                            warn!(backend = %store.backend(), failures = n, error = %e, "table store ping failed");
                        }
                        PingFailure::Down(n) => {
                            error!(backend = %store.backend(), failures = n, error = %e, "table store unreachable");
                            healthy.store(false, Ordering::Relaxed);
                        }
                        PingFailure::StillDown => {}
                    },
                }
            }
        });

        self.task = Some(Periodic { cancel, join });
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop().await;
        }
    }
}

/// Logs the sequencer's debug state every `interval`.
pub struct DebugStateReporter {
    interval: Duration,
    task: Option<Periodic>,
}

impl DebugStateReporter {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            task: None,
        }
    }
}

#[async_trait]
impl Collaborator for DebugStateReporter {
    fn name(&self) -> &'static str {
        "debug-state-reporter"
    }

    async fn start(&mut self, ctx: CollaboratorContext) -> ControlResult<()> {
        let cancel = ctx.cancel.child_token();
        let token = cancel.clone();
        let interval = self.interval;
        let handle = ctx.handle;

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match handle.debug_state().await {
                    Ok(state) => info!(
                        backend = state.backend,
                        resource_views = state.resource_views,
                        registered_nodes = state.registered_nodes,
                        commands_processed = state.commands_processed,
                        commands_failed = state.commands_failed,
                        "debug state"
                    ),
                    Err(e) => {
                        warn!(error = %e, "debug state unavailable");
                        break;
                    }
                }
            }
        });

        self.task = Some(Periodic { cancel, join });
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.stop().await;
        }
    }
}

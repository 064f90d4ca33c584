//! Core rate gate implementation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace};

use super::event::{GateEvent, GateObserver, RefusalReason, TracingObserver};
use crate::config::GateConfig;
use crate::error::{ExecuteError, GateError, Result};

/// Outcome of a single acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller may proceed; the counter was incremented once
    Admitted,
    /// The caller may not proceed; the counter is unchanged
    Refused(RefusalReason),
}

impl Admission {
    /// Whether this outcome grants permission to proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// State guarded by the gate's single mutex.
struct GateState {
    /// Admissions granted in the current window
    count: u64,
    /// When the current window began
    window_start: Instant,
    /// Set once by `shutdown`
    closed: bool,
}

/// A client-side gate that admits at most `limit` calls per `window`.
///
/// The counter is shared by every caller and by one background task that
/// zeroes it every `window`. Both sides go through the same mutex, so
/// increments and resets are totally ordered. Callers wait for the mutex only
/// as long as they ask to; an exhausted quota is reported straight away
/// rather than waited out.
///
/// The gate is meant to be shared behind an `Arc`.
pub struct RateGate {
    limit: u64,
    window: Duration,
    state: Arc<Mutex<GateState>>,
    shutdown: watch::Sender<bool>,
    reset_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    observer: Arc<dyn GateObserver>,
}

impl RateGate {
    /// Create a gate that logs its events through `tracing`.
    ///
    /// The first window starts immediately. The reset task is spawned on the
    /// current tokio runtime; calling this outside of one is a configuration
    /// error.
    pub fn new(window: impl Into<Duration>, limit: u64) -> Result<Self> {
        Self::with_observer(window, limit, Arc::new(TracingObserver))
    }

    /// Create a gate that reports its events to `observer`.
    pub fn with_observer(
        window: impl Into<Duration>,
        limit: u64,
        observer: Arc<dyn GateObserver>,
    ) -> Result<Self> {
        let window = window.into();
        if limit == 0 {
            return Err(GateError::Config(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(GateError::Config(
                "window must be greater than zero".to_string(),
            ));
        }

        let runtime = Handle::try_current().map_err(|e| {
            GateError::Config(format!("a tokio runtime is required: {}", e))
        })?;

        let start = Instant::now();
        let state = Arc::new(Mutex::new(GateState {
            count: 0,
            window_start: start,
            closed: false,
        }));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let reset_task = runtime.spawn(run_reset_task(
            Arc::clone(&state),
            start,
            window,
            shutdown_rx,
            Arc::clone(&observer),
        ));

        info!(limit = limit, window = ?window, "Rate gate started");

        Ok(Self {
            limit,
            window,
            state,
            shutdown,
            reset_task: parking_lot::Mutex::new(Some(reset_task)),
            observer,
        })
    }

    /// Create a gate from a validated configuration section.
    pub fn from_config(config: &GateConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.window, config.limit)
    }

    /// Try to be admitted, waiting at most `max_wait` for the counter lock.
    ///
    /// A zero `max_wait` makes a single non-blocking attempt. Returns
    /// `Err(GateError::Closed)` if the gate is shut down before or while
    /// waiting.
    pub async fn acquire(&self, max_wait: Duration) -> Result<Admission> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Err(GateError::Closed);
        }

        let guard = if max_wait.is_zero() {
            self.state.try_lock().ok()
        } else {
            tokio::select! {
                locked = time::timeout(max_wait, self.state.lock()) => locked.ok(),
                _ = shutdown.wait_for(|closed| *closed) => return Err(GateError::Closed),
            }
        };

        let Some(mut state) = guard else {
            return Ok(self.refuse(RefusalReason::LockTimeout, max_wait));
        };

        if state.closed {
            return Err(GateError::Closed);
        }

        if state.count >= self.limit {
            drop(state);
            return Ok(self.refuse(RefusalReason::LimitReached, max_wait));
        }

        state.count += 1;
        let count = state.count;
        drop(state);

        trace!(count = count, limit = self.limit, "Admission granted");
        self.observer.on_event(&GateEvent::Admitted {
            count,
            limit: self.limit,
        });
        Ok(Admission::Admitted)
    }

    /// Single non-blocking acquisition attempt.
    pub async fn try_acquire(&self) -> Result<Admission> {
        self.acquire(Duration::ZERO).await
    }

    /// Acquire, then run `action` if admitted.
    ///
    /// The action runs after the counter lock has been released. Refusals are
    /// returned as [`ExecuteError::Gate`] without running the action; errors
    /// from the action are returned in [`ExecuteError::Action`] unchanged.
    pub async fn execute<F, Fut, T, E>(
        &self,
        max_wait: Duration,
        action: F,
    ) -> std::result::Result<T, ExecuteError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match self.acquire(max_wait).await? {
            Admission::Admitted => action().await.map_err(ExecuteError::Action),
            Admission::Refused(RefusalReason::LimitReached) => {
                Err(GateError::RateLimited { limit: self.limit }.into())
            }
            Admission::Refused(RefusalReason::LockTimeout) => {
                Err(GateError::LockTimeout { waited: max_wait }.into())
            }
        }
    }

    /// Stop the reset task and refuse every later acquisition.
    ///
    /// Callers blocked in [`acquire`](Self::acquire) are released with
    /// `GateError::Closed`. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }

        self.state.lock().await.closed = true;

        let reset_task = self.reset_task.lock().take();
        if let Some(handle) = reset_task {
            if let Err(err) = handle.await {
                debug!(error = %err, "Reset task ended abnormally");
            }
        }

        info!(limit = self.limit, window = ?self.window, "Rate gate shut down");
        self.observer.on_event(&GateEvent::Closed);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Get the admission limit per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Get the number of admissions granted in the current window.
    pub async fn count(&self) -> u64 {
        self.state.lock().await.count
    }

    /// Get the admissions still available in the current window.
    pub async fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count().await)
    }

    /// Get the duration until the next scheduled reset.
    pub async fn duration_until_reset(&self) -> Duration {
        let window_start = self.state.lock().await.window_start;
        self.window.saturating_sub(window_start.elapsed())
    }

    fn refuse(&self, reason: RefusalReason, waited: Duration) -> Admission {
        self.observer.on_event(&GateEvent::Refused {
            reason,
            limit: self.limit,
            waited,
        });
        Admission::Refused(reason)
    }
}

impl fmt::Debug for RateGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateGate")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for RateGate {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.reset_task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Zero the counter every `window`, measured start to start from `start`.
async fn run_reset_task(
    state: Arc<Mutex<GateState>>,
    start: Instant,
    window: Duration,
    mut shutdown: watch::Receiver<bool>,
    observer: Arc<dyn GateObserver>,
) {
    // The window opened at `start`, so the first reset is one period later.
    let mut ticker = time::interval_at(start + window, window);

    loop {
        let tick = tokio::select! {
            tick = ticker.tick() => tick,
            _ = shutdown.wait_for(|closed| *closed) => break,
        };

        let cleared = {
            let mut state = state.lock().await;
            if state.closed {
                break;
            }
            let cleared = state.count;
            state.count = 0;
            state.window_start = tick;
            cleared
        };

        observer.on_event(&GateEvent::ResetFired { cleared });
    }

    trace!("Reset task stopped");
}

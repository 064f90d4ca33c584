//! Structured gate events and the observer hook that receives them.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why an acquisition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefusalReason {
    /// The window's quota is exhausted
    LimitReached,
    /// The counter lock was not obtained within the caller's wait budget
    LockTimeout,
}

impl fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefusalReason::LimitReached => f.write_str("limit-reached"),
            RefusalReason::LockTimeout => f.write_str("lock-timeout"),
        }
    }
}

/// Something that happened inside a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// A caller was admitted; `count` is the post-increment value
    Admitted { count: u64, limit: u64 },
    /// A caller was refused
    Refused {
        reason: RefusalReason,
        limit: u64,
        waited: Duration,
    },
    /// The reset task zeroed the counter; `cleared` is the count it replaced
    ResetFired { cleared: u64 },
    /// The gate was shut down
    Closed,
}

/// Receiver for gate events.
///
/// Observers are invoked after the counter lock has been released, so a slow
/// observer never delays other admission decisions. They must not block.
pub trait GateObserver: Send + Sync {
    fn on_event(&self, event: &GateEvent);
}

/// Default observer that records events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl GateObserver for TracingObserver {
    fn on_event(&self, event: &GateEvent) {
        match event {
            GateEvent::Admitted { count, limit } => {
                debug!(count = count, limit = limit, "Admitted");
            }
            GateEvent::Refused {
                reason: RefusalReason::LimitReached,
                limit,
                ..
            } => {
                debug!(limit = limit, reason = "limit-reached", "Refused");
            }
            GateEvent::Refused {
                reason: RefusalReason::LockTimeout,
                waited,
                ..
            } => {
                warn!(waited = ?waited, reason = "lock-timeout", "Unable to acquire gate lock");
            }
            GateEvent::ResetFired { cleared } => {
                debug!(cleared = cleared, "Window reset");
            }
            GateEvent::Closed => {
                info!("Gate closed");
            }
        }
    }
}

/// Observer that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GateObserver for NoopObserver {
    fn on_event(&self, _event: &GateEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusal_reason_display() {
        assert_eq!(RefusalReason::LimitReached.to_string(), "limit-reached");
        assert_eq!(RefusalReason::LockTimeout.to_string(), "lock-timeout");
    }

    #[test]
    fn test_tracing_observer_accepts_every_event() {
        let observer = TracingObserver;
        observer.on_event(&GateEvent::Admitted { count: 1, limit: 3 });
        observer.on_event(&GateEvent::Refused {
            reason: RefusalReason::LockTimeout,
            limit: 3,
            waited: Duration::from_millis(5),
        });
        observer.on_event(&GateEvent::ResetFired { cleared: 3 });
        observer.on_event(&GateEvent::Closed);
    }
}

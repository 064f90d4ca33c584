//! Admission control: the rate gate, its windows, and its events.

mod event;
mod rate_gate;
mod window;

pub use event::{GateEvent, GateObserver, NoopObserver, RefusalReason, TracingObserver};
pub use rate_gate::{Admission, RateGate};
pub use window::TimeWindow;

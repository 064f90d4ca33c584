//! Callgate - client-side rate-limited call gate
//!
//! This crate throttles outbound calls to an external API so that no more
//! than a fixed number of calls are admitted per time window. Callers pass
//! through a shared [`gate::RateGate`] before performing their own work; a
//! background task resets the gate's counter at the start of every window.

pub mod config;
pub mod error;
pub mod gate;

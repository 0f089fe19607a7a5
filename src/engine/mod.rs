//! Trading engine module
//!
//! The resilience controller and the per-run session it owns. A single
//! cooperative loop with one poll in flight; the inter-poll wait is the only
//! point where a shutdown signal is observed.

mod backoff;
mod clock;
mod controller;
mod session;

pub use backoff::Backoff;
pub use clock::SessionClock;
pub use controller::{Controller, ControllerState, RunSummary, StopReason};
pub use session::{PnlProxy, RunStats, Session, SignalStrength};

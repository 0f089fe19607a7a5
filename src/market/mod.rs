//! Market data module
//!
//! Builds one immutable snapshot per poll from the exchange's book ticker
//! (and depth, in depth mode) and reduces it to a scalar imbalance.

mod imbalance;
mod snapshot;
mod stale;

pub use imbalance::{depth_sums, imbalance};
pub use snapshot::{fetch_snapshot, BookProblem, MarketSnapshot};
pub use stale::StaleBookGuard;

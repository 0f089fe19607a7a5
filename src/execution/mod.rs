//! Execution engine module
//!
//! Sends approved order intents to the exchange (live) or acknowledges them
//! locally (dry run). The paper portfolio mirrors every accepted intent in
//! both modes.

mod live;
mod paper;
mod types;

pub use live::{DryRunEngine, LiveEngine};
pub use paper::{PaperFill, PaperMark, PaperPortfolio, PaperReject};
pub use types::{ExecutionError, ExecutionReport, OrderIntent};

use async_trait::async_trait;

/// Trait for execution engine implementations
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Submit a market order for the intent. Never retried.
    async fn submit(
        &self,
        symbol: &str,
        intent: &OrderIntent,
    ) -> Result<ExecutionReport, ExecutionError>;
    /// Best-effort cancellation of resting orders, returns how many were cancelled
    async fn cancel_open_orders(&self, symbol: &str) -> Result<usize, ExecutionError>;
    /// Whether orders reach the exchange
    fn is_live(&self) -> bool;
}

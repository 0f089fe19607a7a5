//! Signal pipeline module
//!
//! Turns an imbalance reading into the side that is executed one poll later:
//! threshold, then M-of-K persistence confirmation, then a single-slot delay.

mod confirmation;
mod pipeline;
mod types;

pub use confirmation::ConfirmationWindow;
pub use pipeline::{PendingSignal, PipelineOutput, SignalPipeline};
pub use types::{raw_side, RawSignal, Side, TradeSide};

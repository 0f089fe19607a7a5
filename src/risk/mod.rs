//! Risk management module
//!
//! Position sizing, exchange filter validation and trade limits. A rejection
//! is a logged no-op, never an error.

mod filters;
mod manager;
mod sizing;
mod types;

pub use filters::round_down_step;
pub use manager::{RiskContext, RiskManager};
pub use sizing::{create_sizer, FixedSizer, LinearAbsSizer, LinearExcessSizer, PositionSizer};
pub use types::{RiskRejection, RiskState};

//! Output recording module
//!
//! One append-only row per poll, successful or not.

mod csv_recorder;
mod types;

pub use csv_recorder::CsvRecorder;
pub use types::{OutputRow, RowAction, OUTPUT_HEADER};

use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Recorder errors
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Destination for per-poll output rows
pub trait RowSink: Send {
    fn record(&mut self, row: &OutputRow) -> Result<(), RecorderError>;
}

/// Keeps rows in memory, shared with whoever holds a handle
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<OutputRow>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the rows recorded so far
    pub fn rows(&self) -> Vec<OutputRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl RowSink for MemorySink {
    fn record(&mut self, row: &OutputRow) -> Result<(), RecorderError> {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(row.clone());
        }
        Ok(())
    }
}

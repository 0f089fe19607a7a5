//! Per-poll signal pipeline with one-poll causal delay

use super::{ConfirmationWindow, RawSignal, Side};

/// Single-slot delay buffer
///
/// Read-then-overwrite on every poll: the side released at poll `t` is the
/// side stored at poll `t-1`. Starts out holding HOLD.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingSignal {
    slot: Side,
}

impl PendingSignal {
    /// Release the stored side and store `next` in its place
    pub fn swap(&mut self, next: Side) -> Side {
        std::mem::replace(&mut self.slot, next)
    }

    pub fn peek(&self) -> Side {
        self.slot
    }
}

/// Everything the pipeline decided for one poll
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineOutput {
    pub raw: RawSignal,
    pub confirmed: Side,
    /// Side to act on this poll (the previous poll's confirmed side)
    pub executable: Side,
}

/// Threshold, confirmation and delay, strictly in that order
#[derive(Debug, Clone)]
pub struct SignalPipeline {
    window: ConfirmationWindow,
    pending: PendingSignal,
}

impl SignalPipeline {
    pub fn new(confirmation_m: usize, confirmation_k: usize) -> Self {
        Self {
            window: ConfirmationWindow::new(confirmation_m, confirmation_k),
            pending: PendingSignal::default(),
        }
    }

    /// Run one poll through the pipeline
    ///
    /// `raw` has already been thresholded (and possibly forced to HOLD by
    /// the stale-book guard).
    pub fn step(&mut self, raw: RawSignal) -> PipelineOutput {
        let confirmed = self.window.push(raw.side);
        let executable = self.pending.swap(confirmed);
        PipelineOutput {
            raw,
            confirmed,
            executable,
        }
    }

    /// Side that will be released on the next poll
    pub fn pending(&self) -> Side {
        self.pending.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_poll_executes_hold() {
        let mut pipeline = SignalPipeline::new(1, 1);
        let out = pipeline.step(RawSignal::new(0.9, 0.1));
        assert_eq!(out.confirmed, Side::Buy);
        assert_eq!(out.executable, Side::Hold);
        assert_eq!(pipeline.pending(), Side::Buy);
    }

    #[test]
    fn test_executable_lags_confirmed_by_one_poll() {
        let mut pipeline = SignalPipeline::new(1, 1);
        let readings = [0.5, -0.5, 0.0, 0.5, 0.5, -0.5];
        let mut previous_confirmed = Side::Hold;
        for imbalance in readings {
            let out = pipeline.step(RawSignal::new(imbalance, 0.1));
            assert_eq!(out.executable, previous_confirmed);
            previous_confirmed = out.confirmed;
        }
    }

    #[test]
    fn test_confirmation_before_delay() {
        let mut pipeline = SignalPipeline::new(3, 2);
        let a = pipeline.step(RawSignal::new(0.5, 0.1));
        let b = pipeline.step(RawSignal::new(0.5, 0.1));
        let c = pipeline.step(RawSignal::new(0.0, 0.1));
        assert_eq!(a.confirmed, Side::Hold);
        assert_eq!(b.confirmed, Side::Buy);
        assert_eq!(c.executable, Side::Buy);
        assert_eq!(c.confirmed, Side::Hold);
    }

    #[test]
    fn test_pending_swap() {
        let mut pending = PendingSignal::default();
        assert_eq!(pending.swap(Side::Sell), Side::Hold);
        assert_eq!(pending.swap(Side::Buy), Side::Sell);
        assert_eq!(pending.peek(), Side::Buy);
    }
}

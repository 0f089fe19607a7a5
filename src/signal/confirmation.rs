//! M-of-K persistence confirmation

use super::Side;
use std::collections::VecDeque;

/// FIFO of the last `m` raw sides
///
/// A non-HOLD raw side is confirmed when it appears at least `k` times in
/// the window, counting the side just pushed. A HOLD raw side always
/// confirms HOLD.
#[derive(Debug, Clone)]
pub struct ConfirmationWindow {
    history: VecDeque<Side>,
    m: usize,
    k: usize,
}

impl ConfirmationWindow {
    /// `k` is clamped into `1..=m` and `m` to at least 1
    pub fn new(m: usize, k: usize) -> Self {
        let m = m.max(1);
        Self {
            history: VecDeque::with_capacity(m),
            m,
            k: k.clamp(1, m),
        }
    }

    /// Push this poll's raw side and return the confirmed side
    pub fn push(&mut self, raw: Side) -> Side {
        if self.history.len() == self.m {
            self.history.pop_front();
        }
        self.history.push_back(raw);

        if raw.is_hold() {
            return Side::Hold;
        }
        let hits = self.history.iter().filter(|s| **s == raw).count();
        if hits >= self.k {
            raw
        } else {
            Side::Hold
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(window: &mut ConfirmationWindow, sides: &[Side]) -> Side {
        sides
            .iter()
            .fold(Side::Hold, |_, side| window.push(*side))
    }

    #[test]
    fn test_two_of_three_confirms() {
        let mut window = ConfirmationWindow::new(3, 2);
        assert_eq!(run(&mut window, &[Side::Buy, Side::Hold, Side::Buy]), Side::Buy);
    }

    #[test]
    fn test_mixed_window_holds() {
        let mut window = ConfirmationWindow::new(3, 2);
        assert_eq!(run(&mut window, &[Side::Buy, Side::Sell, Side::Hold]), Side::Hold);
    }

    #[test]
    fn test_single_hit_insufficient() {
        let mut window = ConfirmationWindow::new(3, 2);
        assert_eq!(window.push(Side::Sell), Side::Hold);
        assert_eq!(window.push(Side::Sell), Side::Sell);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = ConfirmationWindow::new(3, 2);
        run(&mut window, &[Side::Buy, Side::Hold, Side::Hold]);
        // first BUY has been evicted
        assert_eq!(window.push(Side::Buy), Side::Hold);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_default_window_passes_through() {
        let mut window = ConfirmationWindow::new(1, 1);
        assert_eq!(window.push(Side::Buy), Side::Buy);
        assert_eq!(window.push(Side::Sell), Side::Sell);
        assert_eq!(window.push(Side::Hold), Side::Hold);
    }

    #[test]
    fn test_k_clamped_to_m() {
        let window = ConfirmationWindow::new(2, 5);
        assert_eq!(window.k(), 2);
        let window = ConfirmationWindow::new(0, 0);
        assert_eq!(window.m(), 1);
        assert_eq!(window.k(), 1);
    }
}

//! Stale-book guard

use super::MarketSnapshot;
use rust_decimal::Decimal;

type BookKey = (Decimal, Decimal, Decimal, Decimal);

/// Detects a frozen book
///
/// Once bid, ask and both quantities have repeated unchanged for more than
/// `limit` consecutive polls, the raw side for that poll is forced to HOLD.
/// A limit of 0 disables the guard.
#[derive(Debug, Clone, Default)]
pub struct StaleBookGuard {
    limit: u32,
    last: Option<BookKey>,
    repeats: u32,
}

impl StaleBookGuard {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            last: None,
            repeats: 0,
        }
    }

    /// Record a snapshot, returning true when it should be treated as stale
    pub fn observe(&mut self, snapshot: &MarketSnapshot) -> bool {
        let key = snapshot.book_key();
        if self.last == Some(key) {
            self.repeats = self.repeats.saturating_add(1);
        } else {
            self.last = Some(key);
            self.repeats = 0;
        }
        self.limit > 0 && self.repeats > self.limit
    }

    /// Consecutive repeats of the current book
    pub fn repeats(&self) -> u32 {
        self.repeats
    }
}

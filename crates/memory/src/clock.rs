//! Strictly increasing timestamps for turn ordering.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::{Mutex, PoisonError};

/// Hands out microsecond-precision timestamps that never repeat or go
/// backwards, even when the wall clock does.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, strictly later than both the previous tick and `floor`.
    pub fn tick_after(&self, floor: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let next = next_after(Utc::now(), (*last).max(floor));
        *last = Some(next);
        next
    }
}

fn next_after(now: DateTime<Utc>, bound: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match bound {
        Some(b) if now <= b => b + Duration::microseconds(1),
        _ => now,
    }
}

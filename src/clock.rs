use std::sync::Mutex;

use jiff::{SignedDuration, Timestamp};

/// Source of "now" for every state transition.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: SignedDuration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now = now.saturating_add(by).unwrap_or(*now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fractional minutes from `start` to `end`. Never negative: a clock that
/// stepped backwards contributes nothing.
pub fn minutes_between(start: Timestamp, end: Timestamp) -> f64 {
    let seconds = end.duration_since(start).as_secs_f64();
    (seconds / 60.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let start = Timestamp::from_second(1_700_000_000).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(SignedDuration::from_mins(5));
        assert_eq!(minutes_between(start, clock.now()), 5.0);
    }

    #[test]
    fn test_minutes_between_is_fractional() {
        let start = Timestamp::from_second(1_700_000_000).unwrap();
        let end = Timestamp::from_second(1_700_000_090).unwrap();
        assert_eq!(minutes_between(start, end), 1.5);
    }

    #[test]
    fn test_backwards_clock_counts_zero() {
        let start = Timestamp::from_second(1_700_000_000).unwrap();
        let end = Timestamp::from_second(1_699_999_000).unwrap();
        assert_eq!(minutes_between(start, end), 0.0);
    }
}

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Wall clock that never hands out the same instant twice.
///
/// Readings are truncated to microseconds, the precision remote documents
/// store, and each one is at least one microsecond after the previous.
#[derive(Debug, Default)]
pub struct Clock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = truncate_micros(Utc::now());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(prev) if wall <= prev => prev + Duration::microseconds(1),
            _ => wall,
        };
        *last = Some(next);
        next
    }

    /// A reading strictly after `floor`
    pub fn after(&self, floor: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.now();
        if now > floor {
            now
        } else {
            let bumped = truncate_micros(floor) + Duration::microseconds(1);
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            *last = Some(bumped);
            bumped
        }
    }
}

fn truncate_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(t.timestamp_micros()).unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_strictly_increase() {
        let clock = Clock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_after_future_floor() {
        let clock = Clock::new();
        let future = Utc::now() + Duration::hours(1);
        let reading = clock.after(future);
        assert!(reading > future);
        assert!(clock.now() > reading);
    }

    #[test]
    fn test_microsecond_precision() {
        let clock = Clock::new();
        let t = clock.now();
        assert_eq!(t.timestamp_subsec_nanos() % 1_000, 0);
    }
}

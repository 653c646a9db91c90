//! Wall-clock source used for entry ages
//!
//! Durable records outlive the process, so ages are measured against
//! `SystemTime` rather than a monotonic instant.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> SystemTime;
}

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Age of `stamp` at `now`; timestamps from the future count as zero age.
pub(crate) fn age(now: SystemTime, stamp: SystemTime) -> Duration {
    now.duration_since(stamp).unwrap_or(Duration::ZERO)
}

pub(crate) fn to_epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub(crate) fn from_epoch_millis(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(age(clock.now(), start), Duration::from_secs(90));
    }

    #[test]
    fn future_stamp_has_zero_age() {
        let now = SystemTime::now();
        assert_eq!(age(now, now + Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn epoch_millis_survive_conversion() {
        let t = from_epoch_millis(1_700_000_123_456);
        assert_eq!(to_epoch_millis(t), 1_700_000_123_456);
    }

    #[test]
    fn far_future_millis_saturate() {
        let t = UNIX_EPOCH + Duration::from_secs(u64::MAX / 1000 + 1);
        assert_eq!(to_epoch_millis(t), u64::MAX);
    }
}

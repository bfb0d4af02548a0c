//! Wall-clock access.
//!
//! Ledgers never call `Utc::now()` directly; they ask an injected [`Clock`].
//! Production uses [`SystemClock`]; tests drive a [`ManualClock`] forward.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += delta;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Whole seconds between two instants, truncated (millisecond remainders
/// are dropped). Negative when `to` precedes `from`.
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    to.signed_duration_since(from).num_seconds()
}

/// Result of checking an elapsed measurement against the anomaly bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elapsed {
    Valid(u64),
    /// Negative, or at/over the bound. Never accounted.
    Anomaly(i64),
}

pub fn classify_elapsed(secs: i64, max_elapsed_secs: i64) -> Elapsed {
    if secs < 0 || secs >= max_elapsed_secs {
        Elapsed::Anomaly(secs)
    } else {
        Elapsed::Valid(secs as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap()
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(t0());
        let other = clock.clone();
        clock.advance_secs(90);
        assert_eq!(other.now(), t0() + Duration::seconds(90));
    }

    #[test]
    fn elapsed_truncates_partial_seconds() {
        let later = t0() + Duration::milliseconds(65_999);
        assert_eq!(elapsed_secs(t0(), later), 65);
    }

    #[test]
    fn elapsed_is_negative_when_clock_went_back() {
        assert_eq!(elapsed_secs(t0(), t0() - Duration::seconds(10)), -10);
    }

    #[test]
    fn classify_rejects_negative_and_oversized() {
        let bound = 86_400 * 30;
        assert_eq!(classify_elapsed(-1, bound), Elapsed::Anomaly(-1));
        assert_eq!(classify_elapsed(bound, bound), Elapsed::Anomaly(bound));
        assert_eq!(classify_elapsed(0, bound), Elapsed::Valid(0));
        assert_eq!(classify_elapsed(bound - 1, bound), Elapsed::Valid((bound - 1) as u64));
    }
}

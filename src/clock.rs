use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Values below this are treated as epoch seconds, anything above as epoch
/// milliseconds. 10^10 seconds is the year 2286.
const SECONDS_THRESHOLD: i64 = 10_000_000_000;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Used for deterministic expiry checks.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_millis: i64) {
        self.now.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Normalizes a timestamp given in either seconds or milliseconds to milliseconds.
pub fn to_millis(value: i64) -> i64 {
    if value.abs() < SECONDS_THRESHOLD {
        value.saturating_mul(1000)
    } else {
        value
    }
}

/// Whether a validity time has passed. A missing or non-positive validity time
/// never expires.
pub fn validity_elapsed(validity_time: Option<i64>, now_millis: i64) -> bool {
    match validity_time {
        Some(v) if v > 0 => to_millis(v) < now_millis,
        _ => false,
    }
}

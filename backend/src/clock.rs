//! Time source for TTL arithmetic and display timestamps.
//!
//! Expiry comparisons must not jump backwards with wall-clock adjustments,
//! so the system clock anchors a wall-clock instant once at startup and
//! derives "now" from the monotonic clock after that. Display values are
//! ordinary UTC timestamps.

use chrono::{DateTime, Duration, Utc};
use std::time::Instant;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock {
    wall_anchor: DateTime<Utc>,
    mono_anchor: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { wall_anchor: Utc::now(), mono_anchor: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed =
            Duration::from_std(self.mono_anchor.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.wall_anchor + elapsed
    }
}

/// Hand-cranked clock for expiry tests.
#[cfg(test)]
pub struct ManualClock {
    base: DateTime<Utc>,
    offset_secs: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self { base, offset_secs: std::sync::atomic::AtomicI64::new(0) }
    }

    pub fn advance_secs(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + Duration::seconds(self.offset_secs.load(std::sync::atomic::Ordering::SeqCst))
    }
}

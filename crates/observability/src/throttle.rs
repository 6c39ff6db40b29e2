//! Rate-limited drop warnings
//!
//! Drop-on-full paths run at sample rate; logging every drop would flood the
//! output. `DropLogger` emits at most one warning per interval and reports how
//! many were suppressed in between.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const NEVER: u64 = u64::MAX;

/// Throttled warning emitter, shareable across threads
#[derive(Debug)]
pub struct DropLogger {
    message: &'static str,
    interval_us: u64,
    base: Instant,
    last_warn_us: AtomicU64,
    suppressed: AtomicU64,
}

impl DropLogger {
    pub fn new(message: &'static str, interval: Duration) -> Self {
        Self {
            message,
            interval_us: u64::try_from(interval.as_micros()).unwrap_or(u64::MAX),
            base: Instant::now(),
            last_warn_us: AtomicU64::new(NEVER),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Record one drop; returns whether a warning was emitted
    pub fn record(&self, target: &str, dropped_total: u64) -> bool {
        let now_us = u64::try_from(self.base.elapsed().as_micros()).unwrap_or(NEVER - 1);
        let last = self.last_warn_us.load(Ordering::Acquire);

        if last != NEVER && now_us.saturating_sub(last) < self.interval_us {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // another thread won the slot
        if self
            .last_warn_us
            .compare_exchange(last, now_us, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
        tracing::warn!(
            target_name = target,
            dropped_total,
            suppressed,
            "{}",
            self.message
        );
        true
    }

    /// Warnings swallowed since the last emitted one
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_drop_always_logged() {
        let logger = DropLogger::new("queue full", Duration::from_secs(60));
        assert!(logger.record("parquet", 1));
    }

    #[test]
    fn test_drops_within_interval_are_suppressed() {
        let logger = DropLogger::new("queue full", Duration::from_secs(60));
        assert!(logger.record("parquet", 1));
        assert!(!logger.record("parquet", 2));
        assert!(!logger.record("parquet", 3));
        assert_eq!(logger.suppressed(), 2);
    }

    #[test]
    fn test_zero_interval_logs_every_drop() {
        let logger = DropLogger::new("queue full", Duration::ZERO);
        assert!(logger.record("broadcast", 1));
        assert!(logger.record("broadcast", 2));
        assert_eq!(logger.suppressed(), 0);
    }
}

//! Clock alignment
//!
//! Sample timestamps come from a monotonic clock; the epoch timestamp is
//! derived by adding an offset estimated once per session. Each probe reads
//! monotonic / UTC / monotonic and the probe with the tightest bracket wins.

use std::time::Instant;

use chrono::Utc;

/// Monotonic microsecond clock anchored at construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    base: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
        }
    }

    /// Microseconds since the clock was created
    pub fn now_us(&self) -> i64 {
        i64::try_from(self.base.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

/// Offset between a monotonic clock and UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockProbe {
    /// UTC ns minus monotonic ns
    offset_ns: i128,
    /// Bracket width of the winning probe (µs)
    latency_us: i64,
}

impl ClockProbe {
    pub const DEFAULT_PROBES: usize = 500;

    /// Known offset, e.g. from a previous calibration
    pub fn from_offset_ns(offset_ns: i128) -> Self {
        Self {
            offset_ns,
            latency_us: 0,
        }
    }

    /// Estimate the offset of `clock` against the wall clock
    pub fn calibrate(clock: &MonotonicClock, probes: usize) -> Self {
        let mut best: Option<Self> = None;

        for _ in 0..probes.max(1) {
            let before = clock.now_us();
            let utc_ns = i128::from(Utc::now().timestamp_nanos_opt().unwrap_or_default());
            let after = clock.now_us();

            let latency_us = after - before;
            if best.is_some_and(|b| b.latency_us <= latency_us) {
                continue;
            }
            let midpoint_us = i128::from(before + after) / 2;
            best = Some(Self {
                offset_ns: utc_ns - midpoint_us * 1_000,
                latency_us,
            });
        }

        let probe = best.unwrap_or_else(|| Self::from_offset_ns(0));
        tracing::debug!(
            offset_ns = %probe.offset_ns,
            latency_us = probe.latency_us,
            "clock offset estimated"
        );
        probe
    }

    /// Convert a monotonic timestamp to Unix epoch milliseconds
    pub fn to_utc_ms(&self, system_us: i64) -> i64 {
        let ns = i128::from(system_us) * 1_000 + self.offset_ns;
        i64::try_from(ns.div_euclid(1_000_000)).unwrap_or(i64::MAX)
    }

    pub fn latency_us(&self) -> i64 {
        self.latency_us
    }
}

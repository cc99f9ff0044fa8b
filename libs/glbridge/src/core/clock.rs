// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Injected monotonic time source and frame-pacing diagnostics.
//!
//! Nothing in this crate reads a global "now"; anything that needs time is
//! handed a clock at construction so tests can drive it.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source, expressed as elapsed time since an arbitrary
/// per-clock epoch.
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Interval between two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInterval {
    pub elapsed: Duration,
}

impl FrameInterval {
    pub fn millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn fps(&self) -> f64 {
        let ms = self.millis();
        if ms > 0.0 { 1000.0 / ms } else { 0.0 }
    }
}

/// Tracks time between frames for throughput diagnostics.
pub struct FramePacer {
    clock: Arc<dyn MonotonicClock>,
    last: Option<Duration>,
}

impl FramePacer {
    pub fn new(clock: Arc<dyn MonotonicClock>) -> Self {
        Self { clock, last: None }
    }

    /// Record a frame; returns the interval since the previous one, or
    /// `None` for the first frame.
    pub fn tick(&mut self) -> Option<FrameInterval> {
        let now = self.clock.now();
        let interval = self
            .last
            .map(|last| FrameInterval {
                elapsed: now.saturating_sub(last),
            });
        self.last = Some(now);
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct ManualClock(Mutex<Duration>);

    impl MonotonicClock for ManualClock {
        fn now(&self) -> Duration {
            *self.0.lock()
        }
    }

    #[test]
    fn test_pacer_intervals() {
        let clock = Arc::new(ManualClock(Mutex::new(Duration::ZERO)));
        let mut pacer = FramePacer::new(clock.clone());

        assert!(pacer.tick().is_none());

        *clock.0.lock() = Duration::from_millis(40);
        let interval = pacer.tick().unwrap();
        assert_eq!(interval.elapsed, Duration::from_millis(40));
        assert!((interval.fps() - 25.0).abs() < 1e-9);
    }
}

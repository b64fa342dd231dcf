use std::time::{Duration, Instant};

use crate::models::ReadProgress;

/// Observer invoked with (record count, records per second, byte
/// progress). Observers must not call back into the pipeline.
pub type ProgressFn = dyn Fn(u64, f64, ReadProgress) + Send + Sync;

/// Snapshot of a breadth-first search frontier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BfsProgress {
    /// Distance of the layer currently being explored.
    pub current_layer: u32,
    /// Number of nodes in the current layer.
    pub layer_size: u32,
    /// Nodes of the current layer already explored.
    pub layer_explored: u32,
    /// Nodes explored across all completed layers.
    pub total_explored: u32,
}

/// Observer for search progress.
pub type BfsProgressFn = dyn Fn(BfsProgress) + Send + Sync;

/// Rate-limits progress reports. Speed is computed over the whole run,
/// not the last interval, so early jitter evens out.
pub struct Throttle {
    start: Instant,
    last: Instant,
    refresh_rate: Duration,
}

impl Throttle {
    pub fn new(refresh_rate: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            refresh_rate,
        }
    }

    /// True when enough time has passed since the last report (or when
    /// forced, used for the final report at end-of-stream). Marks the
    /// report time when returning true.
    pub fn should_fire(&mut self, force: bool) -> bool {
        let now = Instant::now();
        if !force && now.duration_since(self.last) < self.refresh_rate {
            return false;
        }
        self.last = now;
        true
    }

    /// Invoke `callback` with count, speed, and byte progress if the
    /// refresh interval elapsed. Counts passed by callers are
    /// cumulative, so observers see a non-decreasing sequence.
    pub fn tick(
        &mut self,
        count: u64,
        read: ReadProgress,
        callback: Option<&ProgressFn>,
        force: bool,
    ) {
        let Some(callback) = callback else { return };
        if !self.should_fire(force) {
            return;
        }
        let seconds = self.start.elapsed().as_secs_f64().max(1e-6);
        callback(count, count as f64 / seconds, read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn throttle_suppresses_rapid_ticks() {
        let mut throttle = Throttle::new(Duration::from_secs(3600));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let callback = move |_c: u64, _s: f64, _r: ReadProgress| {
            counter.fetch_add(1, Ordering::Relaxed);
        };
        for _ in 0..10 {
            throttle.tick(1, ReadProgress::default(), Some(&callback), false);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn forced_tick_always_fires() {
        let mut throttle = Throttle::new(Duration::from_secs(3600));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let callback = move |_c: u64, _s: f64, _r: ReadProgress| {
            counter.fetch_add(1, Ordering::Relaxed);
        };
        throttle.tick(1, ReadProgress::default(), Some(&callback), true);
        throttle.tick(2, ReadProgress::default(), Some(&callback), true);
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn zero_interval_fires_every_tick() {
        let mut throttle = Throttle::new(Duration::ZERO);
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let callback = move |count: u64, speed: f64, _r: ReadProgress| {
            assert!(speed >= 0.0);
            counter.store(count, Ordering::Relaxed);
        };
        for i in 1..=5 {
            throttle.tick(i, ReadProgress::default(), Some(&callback), false);
        }
        assert_eq!(calls.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn no_callback_is_a_no_op() {
        let mut throttle = Throttle::new(Duration::ZERO);
        throttle.tick(1, ReadProgress::default(), None, true);
    }
}

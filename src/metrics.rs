#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::time::Instant;

/// Optional scheduler throughput counters.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Jobs pushed onto the priority queues.
    pub jobs_submitted: AtomicU64,
    /// Jobs that ran to completion.
    pub jobs_completed: AtomicU64,
    /// Fibers that suspended mid-job on a counter wait.
    pub fibers_parked: AtomicU64,
    /// Counters handed out to batch submitters.
    pub counters_acquired: AtomicU64,
    /// When metrics collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_submitted: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            fibers_parked: AtomicU64::new(0),
            counters_acquired: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_submitted(&self, count: u64) {
        self.jobs_submitted.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_parked(&self) {
        self.fibers_parked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_counter_acquired(&self) {
        self.counters_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            fibers_parked: self.fibers_parked.load(Ordering::Relaxed),
            counters_acquired: self.counters_acquired.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the scheduler counters.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub fibers_parked: u64,
    pub counters_acquired: u64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    pub fn jobs_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.jobs_completed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Jobs submitted but not yet finished (queued, running, or parked).
    pub fn jobs_in_flight(&self) -> i64 {
        self.jobs_submitted as i64 - self.jobs_completed as i64
    }
}

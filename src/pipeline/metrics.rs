// src/pipeline/metrics.rs
//
// Session counters for the presence monitor. The coordinator counts frame
// cycles, detector runs, throttled skips and detector failures, plus every
// absence, smartphone and scheduled alert it queues. The dispatcher counts
// alert deliveries and threshold writes that failed. Clones share the same
// atomics, so both sides write into one summary logged at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_cycles: Arc<AtomicU64>,
    pub detection_runs: Arc<AtomicU64>,
    /// Cycles where the throttle held the detector back
    pub skipped_cycles: Arc<AtomicU64>,
    /// Detector errors; each one is also a skipped cycle
    pub detection_failures: Arc<AtomicU64>,
    pub absence_alerts: Arc<AtomicU64>,
    pub usage_alerts: Arc<AtomicU64>,
    pub scheduled_notices: Arc<AtomicU64>,
    /// Alert sink errors (speaker, webhook)
    pub delivery_failures: Arc<AtomicU64>,
    /// Absence threshold writes to the config store that failed
    pub persist_failures: Arc<AtomicU64>,
    /// Duration of the most recent detector call
    pub detection_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_cycles: Arc::new(AtomicU64::new(0)),
            detection_runs: Arc::new(AtomicU64::new(0)),
            skipped_cycles: Arc::new(AtomicU64::new(0)),
            detection_failures: Arc::new(AtomicU64::new(0)),
            absence_alerts: Arc::new(AtomicU64::new(0)),
            usage_alerts: Arc::new(AtomicU64::new(0)),
            scheduled_notices: Arc::new(AtomicU64::new(0)),
            delivery_failures: Arc::new(AtomicU64::new(0)),
            persist_failures: Arc::new(AtomicU64::new(0)),
            detection_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    /// Mean cycle rate since start-up
    pub fn fps(&self) -> f64 {
        let cycles = self.total_cycles.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            cycles as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            fps: self.fps(),
            detection_runs: self.detection_runs.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            absence_alerts: self.absence_alerts.load(Ordering::Relaxed),
            usage_alerts: self.usage_alerts.load(Ordering::Relaxed),
            scheduled_notices: self.scheduled_notices.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            last_detection_us: self.detection_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_cycles: u64,
    pub fps: f64,
    pub detection_runs: u64,
    pub skipped_cycles: u64,
    pub detection_failures: u64,
    pub absence_alerts: u64,
    pub usage_alerts: u64,
    pub scheduled_notices: u64,
    pub delivery_failures: u64,
    pub persist_failures: u64,
    pub last_detection_us: u64,
    pub elapsed_secs: f64,
}

/// Live loop rate over fixed one-second windows. Reports `initial` until
/// the first window closes.
#[derive(Debug, Clone)]
pub struct RateMeter {
    window: Duration,
    window_start: Option<Instant>,
    cycles_in_window: u32,
    rate: f64,
}

impl RateMeter {
    pub fn new(initial: f64) -> Self {
        Self {
            window: Duration::from_secs(1),
            window_start: None,
            cycles_in_window: 0,
            rate: initial,
        }
    }

    pub fn tick(&mut self, now: Instant) -> f64 {
        let start = *self.window_start.get_or_insert(now);
        self.cycles_in_window += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.window {
            self.rate = self.cycles_in_window as f64 / elapsed.as_secs_f64();
            self.cycles_in_window = 0;
            self.window_start = Some(now);
        }
        self.rate
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

// src/pipeline/coordinator.rs
//
// The frame loop:
//
//   capture → throttle → (detect) → engine → alerts → snapshot → pace
//
// Single writer. The engine lock is taken twice per cycle and never held
// across an await.

use super::control::MonitorHandle;
use super::dispatcher::OutboundSender;
use super::engine::{lock_engine, CycleInput, EngineState, SharedEngine};
use super::metrics::{MetricsSummary, PipelineMetrics, RateMeter};
use crate::error::ConfigError;
use crate::types::{AlertRequest, Config, DetectionCycleResult, StatusSnapshot};
use anyhow::Result;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// External capture + detector collaborator
pub trait DetectionSource: Send {
    /// Grab the next frame. `Ok(false)` once the source is exhausted.
    fn capture(&mut self) -> impl Future<Output = Result<bool>> + Send;

    /// Run the detector on the last captured frame.
    fn detect(&mut self) -> impl Future<Output = Result<DetectionCycleResult>> + Send;
}

pub struct FrameCycleCoordinator<S> {
    source: S,
    engine: SharedEngine,
    outbound: OutboundSender,
    status_tx: watch::Sender<StatusSnapshot>,
    metrics: PipelineMetrics,
    rate: RateMeter,
    frame_budget: Duration,
}

impl<S: DetectionSource> FrameCycleCoordinator<S> {
    /// Build the engine from `config` and return the loop together with the
    /// control handle for the API layer.
    pub fn new(
        config: &Config,
        source: S,
        outbound: OutboundSender,
        metrics: PipelineMetrics,
    ) -> Result<(Self, MonitorHandle), ConfigError> {
        let now = Instant::now();
        let mut engine = EngineState::new(config, now)?;
        let frame_budget = config.capture.frame_budget()?;
        let initial = engine.snapshot(now, config.throttle.target_fps);
        let engine = engine.shared();

        let (status_tx, status_rx) = watch::channel(initial);
        let handle = MonitorHandle::new(engine.clone(), outbound.clone(), status_rx);

        info!(
            "✓ Frame loop ready: max {:.0} FPS, target {:.0} FPS, absence {:.0}s, usage {:.0}s",
            config.capture.max_fps,
            config.throttle.target_fps,
            config.thresholds.absence_seconds,
            config.thresholds.usage_seconds
        );

        Ok((
            Self {
                source,
                engine,
                outbound,
                status_tx,
                metrics,
                rate: RateMeter::new(config.throttle.target_fps),
                frame_budget,
            },
            handle,
        ))
    }

    /// Run until `stop` flips to true, its sender goes away, or the source
    /// is exhausted.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<MetricsSummary> {
        info!("▶️  Frame loop started");
        loop {
            if *stop.borrow() {
                info!("⏹️  Stop requested");
                break;
            }

            let cycle_start = Instant::now();
            if !self.run_cycle().await? {
                info!("⏹️  Source exhausted");
                break;
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.frame_budget {
                tokio::select! {
                    _ = tokio::time::sleep(self.frame_budget - elapsed) => {}
                    changed = stop.changed() => {
                        if changed.is_err() {
                            info!("⏹️  Stop channel closed");
                            break;
                        }
                    }
                }
            }
        }

        let summary = self.metrics.summary();
        info!(
            "Frame loop finished: {} cycles ({:.1} FPS), {} detections, {} skipped, {} failed",
            summary.total_cycles,
            summary.fps,
            summary.detection_runs,
            summary.skipped_cycles,
            summary.detection_failures
        );
        Ok(summary)
    }

    /// One cycle. Returns `Ok(false)` when the source has no more frames.
    pub async fn run_cycle(&mut self) -> Result<bool> {
        if !self.source.capture().await? {
            return Ok(false);
        }

        let now = Instant::now();
        let rate = self.rate.tick(now);
        self.metrics.inc(&self.metrics.total_cycles);

        let should_run = lock_engine(&self.engine).should_run_detection(rate, now);
        let detection = if should_run {
            let started = Instant::now();
            match self.source.detect().await {
                Ok(result) => {
                    self.metrics.inc(&self.metrics.detection_runs);
                    self.metrics.set_timing(
                        &self.metrics.detection_time_us,
                        started.elapsed().as_micros() as u64,
                    );
                    Some(result)
                }
                Err(e) => {
                    // No retry: the cycle is treated as skipped
                    self.metrics.inc(&self.metrics.detection_failures);
                    warn!("⚠️  Detection failed, skipping cycle: {:#}", e);
                    None
                }
            }
        } else {
            self.metrics.inc(&self.metrics.skipped_cycles);
            None
        };

        let input = match &detection {
            Some(result) => CycleInput::Detected(result),
            None => CycleInput::Skipped,
        };
        let wall_clock = chrono::Local::now().naive_local();
        let outcome =
            lock_engine(&self.engine).process_cycle(input, Instant::now(), wall_clock, rate);

        for alert in outcome.alerts {
            self.record_alert(&alert);
            self.outbound.alert(alert);
        }
        self.status_tx.send_replace(outcome.snapshot);
        Ok(true)
    }

    fn record_alert(&self, alert: &AlertRequest) {
        let counter = match alert {
            AlertRequest::Absence { .. } => &self.metrics.absence_alerts,
            AlertRequest::Usage { .. } => &self.metrics.usage_alerts,
            AlertRequest::Scheduled { .. } => &self.metrics.scheduled_notices,
        };
        self.metrics.inc(counter);
        debug!("Queued {} alert", alert.as_str());
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }
}

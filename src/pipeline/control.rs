// src/pipeline/control.rs
//
// Runtime control surface. Cloneable and safe to call from any task while
// the frame loop runs; every mutation goes through the same engine lock.

use super::dispatcher::{Outbound, OutboundSender};
use super::engine::{lock_engine, SharedEngine};
use crate::config::{SmoothingSettingsPatch, ThresholdsPatch};
use crate::error::ConfigError;
use crate::types::{SmoothingConfig, StatusSnapshot, ThresholdsConfig};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone)]
pub struct MonitorHandle {
    engine: SharedEngine,
    outbound: OutboundSender,
    status: watch::Receiver<StatusSnapshot>,
}

impl MonitorHandle {
    pub fn new(
        engine: SharedEngine,
        outbound: OutboundSender,
        status: watch::Receiver<StatusSnapshot>,
    ) -> Self {
        Self {
            engine,
            outbound,
            status,
        }
    }

    /// Add `seconds` to the absence threshold, clear an active absence
    /// alert and persist the new value. Non-positive or oversized amounts
    /// are rejected and change nothing.
    pub fn extend_absence_threshold(&self, seconds: i64) -> bool {
        let result = lock_engine(&self.engine).extend_absence_threshold(seconds, Instant::now());
        match result {
            Ok(threshold) => {
                info!(
                    "⏱️  Absence threshold extended by {}s to {:.0}s",
                    seconds, threshold
                );
                self.persist(threshold);
                true
            }
            Err(e) => {
                warn!("⚠️  Rejected threshold extension: {}", e);
                false
            }
        }
    }

    /// Restore the configured absence threshold and persist it.
    pub fn reset_thresholds(&self) -> bool {
        let threshold = lock_engine(&self.engine).reset_thresholds();
        info!("🔄 Absence threshold reset to {:.0}s", threshold);
        self.persist(threshold);
        true
    }

    /// Most recent snapshot published by the frame loop.
    pub fn status_summary(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn smoothing_settings(&self) -> SmoothingConfig {
        lock_engine(&self.engine).smoothing_settings()
    }

    /// Merge a partial update. On error the current settings are kept.
    pub fn update_smoothing_settings(
        &self,
        patch: &SmoothingSettingsPatch,
    ) -> Result<SmoothingConfig, ConfigError> {
        lock_engine(&self.engine)
            .update_smoothing_settings(patch)
            .inspect_err(|e| warn!("⚠️  Rejected smoothing update: {}", e))
    }

    /// Merge a partial threshold update. A changed absence threshold is
    /// persisted.
    pub fn update_thresholds(&self, patch: &ThresholdsPatch) -> Result<ThresholdsConfig, ConfigError> {
        let updated = lock_engine(&self.engine)
            .update_thresholds(patch)
            .inspect_err(|e| warn!("⚠️  Rejected threshold update: {}", e))?;
        if patch.absence_seconds.is_some() {
            self.persist(updated.absence_seconds);
        }
        Ok(updated)
    }

    pub fn reset_state(&self) {
        lock_engine(&self.engine).reset_state(Instant::now());
    }

    fn persist(&self, seconds: f64) {
        self.outbound
            .send(Outbound::PersistAbsenceThreshold { seconds });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::pipeline::engine::EngineState;
    use tokio::sync::mpsc;

    fn handle() -> (MonitorHandle, mpsc::UnboundedReceiver<Outbound>) {
        let now = Instant::now();
        let mut engine = EngineState::new(&sample_config(), now).unwrap();
        let (_tx, status) = watch::channel(engine.snapshot(now, 15.0));
        let (outbound, rx) = OutboundSender::detached();
        (MonitorHandle::new(engine.shared(), outbound, status), rx)
    }

    #[test]
    fn test_extend_persists_new_threshold() {
        let (handle, mut rx) = handle();
        assert!(handle.extend_absence_threshold(10));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::PersistAbsenceThreshold { seconds: 15.0 }
        );

        assert!(handle.reset_thresholds());
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::PersistAbsenceThreshold { seconds: 5.0 }
        );
    }

    #[test]
    fn test_rejected_extension_persists_nothing() {
        let (handle, mut rx) = handle();
        assert!(!handle.extend_absence_threshold(0));
        assert!(!handle.extend_absence_threshold(-5));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_threshold_patch_persists_only_absence() {
        let (handle, mut rx) = handle();
        let patch = ThresholdsPatch {
            usage_seconds: Some(8.0),
            ..Default::default()
        };
        let updated = handle.update_thresholds(&patch).unwrap();
        assert_eq!(updated.usage_seconds, 8.0);
        assert!(rx.try_recv().is_err());

        let patch = ThresholdsPatch {
            absence_seconds: Some(12.0),
            ..Default::default()
        };
        handle.update_thresholds(&patch).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::PersistAbsenceThreshold { seconds: 12.0 }
        );
    }

    #[test]
    fn test_unrepresentable_threshold_patch_is_rejected() {
        let (handle, mut rx) = handle();
        let patch = ThresholdsPatch {
            absence_seconds: Some(1e20),
            ..Default::default()
        };
        assert!(matches!(
            handle.update_thresholds(&patch),
            Err(ConfigError::DurationOutOfRange { .. })
        ));
        assert!(rx.try_recv().is_err());

        // Lock is still usable and the threshold unchanged
        assert!(handle.extend_absence_threshold(1));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::PersistAbsenceThreshold { seconds: 6.0 }
        );
    }

    #[test]
    fn test_status_summary_reads_published_snapshot() {
        let (handle, _rx) = handle();
        let status = handle.status_summary();
        assert!(status.person_detected);
        assert_eq!(status.absence_threshold, 5.0);
        assert_eq!(status.smartphone_grace_period, 3.0);
    }
}

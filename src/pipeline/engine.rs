// src/pipeline/engine.rs
//
// Everything the frame loop mutates, in one place. The coordinator and the
// runtime control surface share a single `EngineState` behind one mutex, so
// a threshold extension can never interleave with half a cycle.

use crate::analysis::{
    AdaptiveThrottle, PresenceStateMachine, ScheduleGate, SmartphoneStateMachine,
    ThresholdController, ThrottleStats,
};
use crate::config::{SmoothingSettingsPatch, ThresholdsPatch};
use crate::detection::DetectionStabilizer;
use crate::error::ConfigError;
use crate::types::{
    AlertRequest, Config, DetectionCycleResult, SmoothingConfig, StatusSnapshot, ThresholdsConfig,
};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::info;

pub type SharedEngine = Arc<Mutex<EngineState>>;

/// Lock the engine. The state machines keep their invariants between
/// statements, so a poisoned lock is still safe to use.
pub fn lock_engine(engine: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
pub enum CycleInput<'a> {
    Detected(&'a DetectionCycleResult),
    /// Detector did not run; last cycle's stabilised signals carry over
    Skipped,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub snapshot: StatusSnapshot,
    pub alerts: Vec<AlertRequest>,
}

pub struct EngineState {
    stabilizer: DetectionStabilizer,
    throttle: AdaptiveThrottle,
    presence: PresenceStateMachine,
    smartphone: SmartphoneStateMachine,
    thresholds: ThresholdController,
    schedule: ScheduleGate,

    // Stabilised signals from the last detector run
    person_detected: bool,
    smartphone_detected: bool,
}

impl EngineState {
    pub fn new(config: &Config, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            stabilizer: DetectionStabilizer::new(config.detection.clone())?,
            throttle: AdaptiveThrottle::new(config.throttle, now)?,
            presence: PresenceStateMachine::new(now),
            smartphone: SmartphoneStateMachine::new(),
            thresholds: ThresholdController::new(&config.thresholds)?,
            schedule: ScheduleGate::new(&config.schedule)?,
            person_detected: true,
            smartphone_detected: false,
        })
    }

    pub fn shared(self) -> SharedEngine {
        Arc::new(Mutex::new(self))
    }

    pub fn should_run_detection(&mut self, current_rate: f64, now: Instant) -> bool {
        self.throttle.should_run(current_rate, now)
    }

    /// One cycle: stabilise (if the detector ran), advance both state
    /// machines, poll the schedule and project a snapshot.
    pub fn process_cycle(
        &mut self,
        input: CycleInput<'_>,
        now: Instant,
        wall_clock: NaiveDateTime,
        current_rate: f64,
    ) -> CycleOutcome {
        if let CycleInput::Detected(result) = input {
            let (person_stable, device_stable) = self.stabilize_all(result);
            self.person_detected = result.person_detected || person_stable;
            self.smartphone_detected = device_stable;
        }

        let mut alerts = Vec::new();
        alerts.extend(self.presence.update(
            self.person_detected,
            now,
            self.thresholds.absence_threshold,
        ));
        alerts.extend(self.smartphone.update(
            self.smartphone_detected,
            now,
            self.thresholds.usage_threshold,
            self.thresholds.grace_period,
        ));
        alerts.extend(self.schedule.check_if_due(wall_clock));

        CycleOutcome {
            snapshot: self.snapshot(now, current_rate),
            alerts,
        }
    }

    /// Feeds every known key, including ones absent from this result, so
    /// missing objects age out. Returns whether the person and device keys
    /// have stable output.
    fn stabilize_all(&mut self, result: &DetectionCycleResult) -> (bool, bool) {
        let person_key = self.stabilizer.settings().person_key.clone();
        let device_key = self.stabilizer.settings().smartphone_key.clone();
        let keys: BTreeSet<String> = result
            .detections
            .keys()
            .cloned()
            .chain(self.stabilizer.known_keys())
            .chain([person_key.clone(), device_key.clone()])
            .collect();

        let mut person_present = false;
        let mut device_present = false;
        for key in keys {
            let detections = result
                .detections
                .get(&key)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let stable = self.stabilizer.stabilize(&key, detections);
            if key == person_key {
                person_present = !stable.is_empty();
            }
            if key == device_key {
                device_present = !stable.is_empty();
            }
        }
        (person_present, device_present)
    }

    pub fn snapshot(&mut self, now: Instant, current_rate: f64) -> StatusSnapshot {
        StatusSnapshot {
            person_detected: self.person_detected,
            smartphone_detected: self.smartphone_detected,
            absence_time: self.presence.absence_duration(now).as_secs_f64(),
            smartphone_use_time: self.smartphone.usage_duration(now).as_secs_f64(),
            absence_alert: self.presence.alert_active(),
            smartphone_alert: self.smartphone.alert_active(),
            absence_threshold: self.thresholds.absence_threshold.as_secs_f64(),
            smartphone_threshold: self.thresholds.usage_threshold.as_secs_f64(),
            smartphone_grace_period: self.thresholds.grace_period.as_secs_f64(),
            fps: current_rate,
            skip_rate: self.throttle.skip_rate(),
            extension: self.thresholds.display_info(now),
        }
    }

    // ========================================================================
    // RUNTIME CONTROL
    // ========================================================================

    /// Extend the absence threshold and clear any active absence alert.
    /// Returns the new threshold in seconds.
    pub fn extend_absence_threshold(
        &mut self,
        seconds: i64,
        now: Instant,
    ) -> Result<f64, ConfigError> {
        let threshold = self.thresholds.extend(seconds, now)?;
        self.presence.clear_alert();
        Ok(threshold.as_secs_f64())
    }

    /// Restore the configured absence threshold. Returns it in seconds.
    pub fn reset_thresholds(&mut self) -> f64 {
        self.thresholds.reset();
        self.presence.clear_alert();
        self.thresholds.absence_threshold.as_secs_f64()
    }

    pub fn update_thresholds(
        &mut self,
        patch: &ThresholdsPatch,
    ) -> Result<ThresholdsConfig, ConfigError> {
        self.thresholds.update(patch)
    }

    pub fn smoothing_settings(&self) -> SmoothingConfig {
        self.stabilizer.settings().clone()
    }

    pub fn update_smoothing_settings(
        &mut self,
        patch: &SmoothingSettingsPatch,
    ) -> Result<SmoothingConfig, ConfigError> {
        let merged = patch.apply_to(self.stabilizer.settings())?;
        self.stabilizer.update_settings(merged.clone())?;
        info!(
            "🔧 Smoothing settings updated: hysteresis {:.2}/{:.2}, window {}, weight {:.1}, max missing {}, fade {:.2}",
            merged.hysteresis.high_threshold,
            merged.hysteresis.low_threshold,
            merged.moving_average.window_size,
            merged.moving_average.weight_recent,
            merged.interpolation.max_missing_frames,
            merged.interpolation.fade_out_factor
        );
        Ok(merged)
    }

    /// Back to the start-up state; thresholds are kept.
    pub fn reset_state(&mut self, now: Instant) {
        self.stabilizer.reset_state();
        self.throttle.reset(now);
        self.presence = PresenceStateMachine::new(now);
        self.smartphone.reset();
        self.person_detected = true;
        self.smartphone_detected = false;
        info!("🔄 Engine state reset");
    }

    pub fn throttle_stats(&self) -> ThrottleStats {
        self.throttle.stats()
    }

    pub fn presence(&self) -> &PresenceStateMachine {
        &self.presence
    }

    pub fn smartphone(&self) -> &SmartphoneStateMachine {
        &self.smartphone
    }
}

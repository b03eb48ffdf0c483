// src/detection/stabilizer.rs
//
// Per-object-key stabilisation of raw detector output.
//
//   raw detections → hysteresis gate → weighted smoother → output
//                          │ (nothing accepted)
//                          └──→ interpolation of last stable set, faded
//
// Pure data transform: no I/O, no clocks.

use super::smoother::WeightedBoxSmoother;
use crate::error::ConfigError;
use crate::types::{DetectionConfig, HysteresisConfig, RawDetection, StableDetection};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Stabiliser state for one object key
#[derive(Debug, Clone)]
pub struct TrackedObjectState {
    smoother: WeightedBoxSmoother,
    tracking: bool,
    missing_count: u32,
    last_stable: Vec<StableDetection>,
}

impl TrackedObjectState {
    fn new(settings: &DetectionConfig) -> Self {
        Self {
            smoother: WeightedBoxSmoother::new(
                settings.moving_average.window_size,
                settings.moving_average.weight_recent,
            ),
            tracking: false,
            missing_count: 0,
            last_stable: Vec::new(),
        }
    }

    /// Dual-threshold acceptance. Entering requires `high`, staying requires `low`.
    fn gate(&mut self, confidence: f64, hysteresis: &HysteresisConfig) -> bool {
        if self.tracking {
            if confidence >= hysteresis.low_threshold {
                true
            } else {
                self.tracking = false;
                false
            }
        } else if confidence >= hysteresis.high_threshold {
            self.tracking = true;
            true
        } else {
            false
        }
    }

    fn drop_history(&mut self) {
        self.tracking = false;
        self.last_stable.clear();
        self.smoother.reset();
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn missing_count(&self) -> u32 {
        self.missing_count
    }
}

pub struct DetectionStabilizer {
    settings: DetectionConfig,
    objects: HashMap<String, TrackedObjectState>,
}

impl DetectionStabilizer {
    pub fn new(settings: DetectionConfig) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            settings,
            objects: HashMap::new(),
        })
    }

    /// Stabilise one cycle's detections for `object_key`.
    ///
    /// Only the state of `object_key` is touched. Malformed entries are
    /// logged and dropped.
    pub fn stabilize(
        &mut self,
        object_key: &str,
        detections: &[RawDetection],
    ) -> Vec<StableDetection> {
        let hysteresis = self.settings.hysteresis;
        let moving_average = self.settings.moving_average;
        let interpolation = self.settings.interpolation;
        let state = self.object_state(object_key);

        let mut output = Vec::new();
        for raw in detections {
            let Some(detection) = raw.validated() else {
                warn!(
                    "⚠️  [{}] Dropping malformed detection (label={}, confidence={:?}, bbox={:?})",
                    object_key, raw.label, raw.confidence, raw.bbox
                );
                continue;
            };

            let was_tracking = state.tracking;
            let accepted = if hysteresis.enabled {
                state.gate(detection.confidence, &hysteresis)
            } else {
                state.tracking = true;
                true
            };
            if was_tracking != state.tracking {
                debug!(
                    "[{}] tracking {} at confidence {:.2}",
                    object_key,
                    if state.tracking { "acquired" } else { "lost" },
                    detection.confidence
                );
            }
            if !accepted {
                continue;
            }

            let stable = if moving_average.enabled {
                state.smoother.smooth(detection)
            } else {
                detection
            };
            output.push(stable);
        }

        if !output.is_empty() {
            state.missing_count = 0;
            state.last_stable = output.clone();
            return output;
        }

        // Nothing accepted this cycle
        if state.last_stable.is_empty() {
            return output;
        }

        state.missing_count += 1;
        let max_missing = if interpolation.enabled {
            interpolation.max_missing_frames
        } else {
            0
        };
        if state.missing_count > max_missing {
            debug!(
                "[{}] missing for {} cycles, dropping track",
                object_key, state.missing_count
            );
            state.drop_history();
            return output;
        }

        let fade = interpolation.fade_out_factor.powi(state.missing_count as i32);
        state
            .last_stable
            .iter()
            .map(|d| StableDetection {
                confidence: d.confidence * fade,
                interpolated: true,
                ..d.clone()
            })
            .collect()
    }

    /// Get-or-insert the state for `object_key`.
    fn object_state(&mut self, object_key: &str) -> &mut TrackedObjectState {
        let settings = &self.settings;
        self.objects
            .entry(object_key.to_string())
            .or_insert_with(|| TrackedObjectState::new(settings))
    }

    pub fn settings(&self) -> &DetectionConfig {
        &self.settings
    }

    /// Replace the settings. Existing buffers are resized in place.
    pub fn update_settings(&mut self, settings: DetectionConfig) -> Result<(), ConfigError> {
        settings.validate()?;
        let window_changed =
            settings.moving_average.window_size != self.settings.moving_average.window_size;
        for state in self.objects.values_mut() {
            if window_changed {
                state.smoother.resize(settings.moving_average.window_size);
            }
            state
                .smoother
                .set_weight_recent(settings.moving_average.weight_recent);
        }
        self.settings = settings;
        Ok(())
    }

    /// Forget all tracked objects.
    pub fn reset_state(&mut self) {
        for state in self.objects.values_mut() {
            state.drop_history();
            state.missing_count = 0;
        }
    }

    /// Keys observed at least once
    pub fn known_keys(&self) -> impl Iterator<Item = String> + '_ {
        self.objects.keys().cloned()
    }

    pub fn object(&self, object_key: &str) -> Option<&TrackedObjectState> {
        self.objects.get(object_key)
    }

    pub fn is_tracking(&self, object_key: &str) -> bool {
        self.objects
            .get(object_key)
            .map(|s| s.tracking)
            .unwrap_or(false)
    }
}

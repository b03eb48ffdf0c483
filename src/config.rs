use crate::error::ConfigError;
use crate::types::{
    CaptureConfig, Config, DetectionConfig, HysteresisConfig, InterpolationConfig, MovingAverageConfig,
    ThresholdsConfig, ThrottleConfig,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Schedule entries are validated when the schedule gate parses them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.throttle.validate()?;
        self.thresholds.validate()?;
        positive_seconds("schedule.check_interval_seconds", self.schedule.check_interval_seconds)?;
        self.capture.frame_budget()?;
        Ok(())
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.hysteresis;
        require_unit("hysteresis.high_threshold", h.high_threshold)?;
        require_unit("hysteresis.low_threshold", h.low_threshold)?;
        if h.low_threshold >= h.high_threshold {
            return Err(ConfigError::HysteresisOrder {
                low: h.low_threshold,
                high: h.high_threshold,
            });
        }

        let ma = &self.moving_average;
        if ma.window_size == 0 {
            return Err(ConfigError::NonPositive {
                name: "moving_average.window_size",
                value: 0.0,
            });
        }
        if !ma.weight_recent.is_finite() || ma.weight_recent < 1.0 {
            return Err(ConfigError::InvalidWeight(ma.weight_recent));
        }

        let fade = self.interpolation.fade_out_factor;
        if !(fade > 0.0 && fade <= 1.0) {
            return Err(ConfigError::InvalidFadeFactor(fade));
        }
        Ok(())
    }
}

impl ThrottleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("throttle.target_fps", self.target_fps)?;
        require_positive("throttle.min_fps", self.min_fps)?;
        positive_seconds("throttle.adjustment_interval_secs", self.adjustment_interval_secs)?;
        require_positive("throttle.max_skip_rate", self.max_skip_rate as f64)?;
        require_positive("throttle.initial_skip_rate", self.initial_skip_rate as f64)?;
        if self.min_fps > self.target_fps {
            return Err(ConfigError::RateOrder {
                min: self.min_fps,
                target: self.target_fps,
            });
        }
        Ok(())
    }
}

impl ThresholdsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive_seconds("thresholds.absence_seconds", self.absence_seconds)?;
        positive_seconds("thresholds.usage_seconds", self.usage_seconds)?;
        non_negative_seconds("thresholds.grace_period_seconds", self.grace_period_seconds)?;
        Ok(())
    }
}

impl CaptureConfig {
    /// Minimum wall time per frame cycle
    pub fn frame_budget(&self) -> Result<Duration, ConfigError> {
        require_positive("capture.max_fps", self.max_fps)?;
        Duration::try_from_secs_f64(1.0 / self.max_fps).map_err(|_| {
            ConfigError::DurationOutOfRange {
                name: "capture.max_fps",
                value: self.max_fps,
            }
        })
    }
}

/// Positive seconds that convert to a `Duration` without overflow
pub(crate) fn positive_seconds(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    require_positive(name, value)?;
    to_duration(name, value)
}

pub(crate) fn non_negative_seconds(
    name: &'static str,
    value: f64,
) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    to_duration(name, value)
}

fn to_duration(name: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::DurationOutOfRange { name, value })
}

fn require_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

fn require_unit(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

// ============================================================================
// PARTIAL UPDATES
// ============================================================================

/// Partial update for the stabiliser settings. Absent fields keep their
/// current value; nested sections merge field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingSettingsPatch {
    pub hysteresis: Option<HysteresisPatch>,
    pub moving_average: Option<MovingAveragePatch>,
    pub interpolation: Option<InterpolationPatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisPatch {
    pub enabled: Option<bool>,
    pub high_threshold: Option<f64>,
    pub low_threshold: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MovingAveragePatch {
    pub enabled: Option<bool>,
    pub window_size: Option<usize>,
    pub weight_recent: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationPatch {
    pub enabled: Option<bool>,
    pub max_missing_frames: Option<u32>,
    pub fade_out_factor: Option<f64>,
}

impl SmoothingSettingsPatch {
    /// Merge onto `current` and validate the result. `current` is not touched.
    pub fn apply_to(&self, current: &DetectionConfig) -> Result<DetectionConfig, ConfigError> {
        let mut merged = current.clone();
        if let Some(p) = &self.hysteresis {
            merge_hysteresis(&mut merged.hysteresis, p);
        }
        if let Some(p) = &self.moving_average {
            merge_moving_average(&mut merged.moving_average, p);
        }
        if let Some(p) = &self.interpolation {
            merge_interpolation(&mut merged.interpolation, p);
        }
        merged.validate()?;
        Ok(merged)
    }
}

fn merge_hysteresis(target: &mut HysteresisConfig, patch: &HysteresisPatch) {
    if let Some(v) = patch.enabled {
        target.enabled = v;
    }
    if let Some(v) = patch.high_threshold {
        target.high_threshold = v;
    }
    if let Some(v) = patch.low_threshold {
        target.low_threshold = v;
    }
}

fn merge_moving_average(target: &mut MovingAverageConfig, patch: &MovingAveragePatch) {
    if let Some(v) = patch.enabled {
        target.enabled = v;
    }
    if let Some(v) = patch.window_size {
        target.window_size = v;
    }
    if let Some(v) = patch.weight_recent {
        target.weight_recent = v;
    }
}

fn merge_interpolation(target: &mut InterpolationConfig, patch: &InterpolationPatch) {
    if let Some(v) = patch.enabled {
        target.enabled = v;
    }
    if let Some(v) = patch.max_missing_frames {
        target.max_missing_frames = v;
    }
    if let Some(v) = patch.fade_out_factor {
        target.fade_out_factor = v;
    }
}

/// Hot reload of the alert thresholds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsPatch {
    pub absence_seconds: Option<f64>,
    pub usage_seconds: Option<f64>,
    pub grace_period_seconds: Option<f64>,
}

impl ThresholdsPatch {
    pub fn apply_to(&self, current: &ThresholdsConfig) -> Result<ThresholdsConfig, ConfigError> {
        let mut merged = *current;
        if let Some(v) = self.absence_seconds {
            merged.absence_seconds = v;
        }
        if let Some(v) = self.usage_seconds {
            merged.usage_seconds = v;
        }
        if let Some(v) = self.grace_period_seconds {
            merged.grace_period_seconds = v;
        }
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_YAML: &str = r#"
detection:
  hysteresis:
    high_threshold: 0.6
    low_threshold: 0.4
  moving_average:
    window_size: 5
    weight_recent: 2.0
  interpolation:
    max_missing_frames: 3
    fade_out_factor: 0.85
thresholds:
  absence_seconds: 5
  usage_seconds: 5
  grace_period_seconds: 3
schedule:
  check_interval_seconds: 10
  entries:
    - time: "14:30"
      content: report
"#;

    pub(crate) fn sample_config() -> Config {
        serde_yaml::from_str(SAMPLE_YAML).unwrap()
    }

    #[test]
    fn test_sample_config_defaults() {
        let config = sample_config();
        config.validate().unwrap();
        assert!(config.detection.hysteresis.enabled);
        assert_eq!(config.detection.smartphone_key, "smartphone");
        assert_eq!(config.throttle.target_fps, 15.0);
        assert_eq!(config.throttle.min_fps, 10.0);
        assert_eq!(config.throttle.max_skip_rate, 5);
        assert_eq!(config.capture.max_fps, 30.0);
    }

    #[test]
    fn test_weight_recent_is_required() {
        let yaml = SAMPLE_YAML.replace("    weight_recent: 2.0\n", "");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_inverted_hysteresis_rejected() {
        let mut config = sample_config();
        config.detection.hysteresis.low_threshold = 0.7;
        assert_eq!(
            config.validate(),
            Err(ConfigError::HysteresisOrder {
                low: 0.7,
                high: 0.6
            })
        );
    }

    #[test]
    fn test_non_positive_threshold_rejected() {
        let mut config = sample_config();
        config.thresholds.absence_seconds = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                name: "thresholds.absence_seconds",
                ..
            })
        ));
    }

    #[test]
    fn test_patch_merges_nested_fields() {
        let current = sample_config().detection;
        let patch: SmoothingSettingsPatch =
            serde_json::from_str(r#"{"moving_average":{"window_size":3}}"#).unwrap();
        let merged = patch.apply_to(&current).unwrap();
        assert_eq!(merged.moving_average.window_size, 3);
        assert_eq!(merged.moving_average.weight_recent, 2.0);
        assert_eq!(merged.hysteresis, current.hysteresis);
    }

    #[test]
    fn test_patch_validation_leaves_current_untouched() {
        let current = sample_config().detection;
        let patch = SmoothingSettingsPatch {
            hysteresis: Some(HysteresisPatch {
                low_threshold: Some(0.9),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(patch.apply_to(&current).is_err());
        assert_eq!(current.hysteresis.low_threshold, 0.4);
    }

    #[test]
    fn test_unrepresentable_durations_rejected() {
        let mut config = sample_config();
        config.throttle.adjustment_interval_secs = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DurationOutOfRange {
                name: "throttle.adjustment_interval_secs",
                ..
            })
        ));

        let mut config = sample_config();
        config.capture.max_fps = 1e-300;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DurationOutOfRange {
                name: "capture.max_fps",
                ..
            })
        ));

        let mut config = sample_config();
        config.schedule.check_interval_seconds = 1e20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_budget() {
        let config = sample_config();
        let budget = config.capture.frame_budget().unwrap();
        assert!((budget.as_secs_f64() - 1.0 / 30.0).abs() < 1e-9);
    }
}

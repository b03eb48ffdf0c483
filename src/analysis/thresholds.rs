// src/analysis/thresholds.rs

use crate::config::{non_negative_seconds, positive_seconds, ThresholdsPatch};
use crate::error::ConfigError;
use crate::types::{ExtensionDisplay, ThresholdsConfig};
use std::time::{Duration, Instant};
use tracing::info;

/// How long the "extension applied" banner stays visible
pub const EXTENSION_DISPLAY_WINDOW: Duration = Duration::from_secs(5);

/// Runtime-mutable alert thresholds
#[derive(Debug, Clone)]
pub struct ThresholdController {
    /// Configured absence threshold; `reset()` returns here
    original_absence: Duration,

    pub absence_threshold: Duration,
    pub usage_threshold: Duration,
    pub grace_period: Duration,

    // Extension banner
    extension_seconds: u32,
    extension_applied_at: Option<Instant>,
}

impl ThresholdController {
    pub fn new(config: &ThresholdsConfig) -> Result<Self, ConfigError> {
        let absence = positive_seconds("thresholds.absence_seconds", config.absence_seconds)?;
        let usage = positive_seconds("thresholds.usage_seconds", config.usage_seconds)?;
        let grace =
            non_negative_seconds("thresholds.grace_period_seconds", config.grace_period_seconds)?;
        Ok(Self {
            original_absence: absence,
            absence_threshold: absence,
            usage_threshold: usage,
            grace_period: grace,
            extension_seconds: 0,
            extension_applied_at: None,
        })
    }

    /// Add `seconds` to the absence threshold. Non-positive or oversized
    /// input is rejected without touching any state. Returns the new
    /// threshold.
    pub fn extend(&mut self, seconds: i64, now: Instant) -> Result<Duration, ConfigError> {
        if seconds <= 0 {
            return Err(ConfigError::NonPositiveExtension(seconds));
        }
        let amount =
            u32::try_from(seconds).map_err(|_| ConfigError::ExtensionTooLarge(seconds))?;
        let previous = self.absence_threshold;
        self.absence_threshold = previous
            .checked_add(Duration::from_secs(u64::from(amount)))
            .ok_or(ConfigError::ExtensionTooLarge(seconds))?;
        self.extension_seconds = amount;
        self.extension_applied_at = Some(now);

        info!(
            "⏳ Absence threshold extended by {}s: {:.0}s → {:.0}s",
            amount,
            previous.as_secs_f64(),
            self.absence_threshold.as_secs_f64()
        );
        Ok(self.absence_threshold)
    }

    /// Banner state for UIs. Clears itself once the display window is over.
    pub fn display_info(&mut self, now: Instant) -> ExtensionDisplay {
        let Some(applied_at) = self.extension_applied_at else {
            return ExtensionDisplay::default();
        };

        let elapsed = now.saturating_duration_since(applied_at);
        if elapsed >= EXTENSION_DISPLAY_WINDOW {
            self.extension_applied_at = None;
            self.extension_seconds = 0;
            return ExtensionDisplay::default();
        }

        ExtensionDisplay {
            should_display: true,
            extension_amount: self.extension_seconds,
            remaining: (EXTENSION_DISPLAY_WINDOW - elapsed).as_secs_f64(),
        }
    }

    /// Restore the configured absence threshold and drop the extension banner.
    pub fn reset(&mut self) -> bool {
        self.absence_threshold = self.original_absence;
        self.extension_seconds = 0;
        self.extension_applied_at = None;
        info!(
            "⏳ Absence threshold reset to {:.0}s",
            self.absence_threshold.as_secs_f64()
        );
        true
    }

    /// Hot reload. A new absence value also becomes the reset target.
    pub fn update(&mut self, patch: &ThresholdsPatch) -> Result<ThresholdsConfig, ConfigError> {
        let merged = patch.apply_to(&self.as_config())?;
        let updated = Self::new(&merged)?;
        if patch.absence_seconds.is_some() {
            self.original_absence = updated.original_absence;
            self.absence_threshold = updated.absence_threshold;
        }
        self.usage_threshold = updated.usage_threshold;
        self.grace_period = updated.grace_period;
        Ok(self.as_config())
    }

    pub fn as_config(&self) -> ThresholdsConfig {
        ThresholdsConfig {
            absence_seconds: self.absence_threshold.as_secs_f64(),
            usage_seconds: self.usage_threshold.as_secs_f64(),
            grace_period_seconds: self.grace_period.as_secs_f64(),
        }
    }

    pub fn original_absence(&self) -> Duration {
        self.original_absence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ThresholdController {
        ThresholdController::new(&ThresholdsConfig {
            absence_seconds: 5.0,
            usage_seconds: 10.0,
            grace_period_seconds: 3.0,
        })
        .unwrap()
    }

    #[test]
    fn test_extend_adds_to_current() {
        let t0 = Instant::now();
        let mut c = controller();
        assert_eq!(c.extend(10, t0), Ok(Duration::from_secs(15)));
        assert_eq!(c.extend(5, t0), Ok(Duration::from_secs(20)));
    }

    #[test]
    fn test_extend_rejects_non_positive() {
        let t0 = Instant::now();
        let mut c = controller();
        assert_eq!(c.extend(-1, t0), Err(ConfigError::NonPositiveExtension(-1)));
        assert_eq!(c.extend(0, t0), Err(ConfigError::NonPositiveExtension(0)));
        assert_eq!(c.absence_threshold, Duration::from_secs(5));
        assert!(!c.display_info(t0).should_display);
    }

    #[test]
    fn test_display_window_self_clears() {
        let t0 = Instant::now();
        let mut c = controller();
        c.extend(10, t0).unwrap();

        let info = c.display_info(t0 + Duration::from_secs(2));
        assert!(info.should_display);
        assert_eq!(info.extension_amount, 10);
        assert!((info.remaining - 3.0).abs() < 1e-9);

        let expired = c.display_info(t0 + Duration::from_secs(5));
        assert_eq!(expired, ExtensionDisplay::default());
        // Cleared internally, not just hidden
        assert_eq!(c.display_info(t0), ExtensionDisplay::default());
        // The threshold itself is kept
        assert_eq!(c.absence_threshold, Duration::from_secs(15));
    }

    #[test]
    fn test_reset_restores_original() {
        let t0 = Instant::now();
        let mut c = controller();
        c.extend(30, t0).unwrap();
        assert!(c.reset());
        assert_eq!(c.absence_threshold, Duration::from_secs(5));
        assert!(!c.display_info(t0).should_display);
    }

    #[test]
    fn test_update_validates_and_moves_reset_target() {
        let mut c = controller();
        let bad = ThresholdsPatch {
            usage_seconds: Some(-3.0),
            ..Default::default()
        };
        assert!(c.update(&bad).is_err());
        assert_eq!(c.usage_threshold, Duration::from_secs(10));

        let good = ThresholdsPatch {
            absence_seconds: Some(60.0),
            grace_period_seconds: Some(1.0),
            ..Default::default()
        };
        c.update(&good).unwrap();
        assert_eq!(c.original_absence(), Duration::from_secs(60));
        assert_eq!(c.grace_period, Duration::from_secs(1));
    }

    #[test]
    fn test_extend_rejects_oversized_amount() {
        let t0 = Instant::now();
        let mut c = controller();
        assert_eq!(
            c.extend(i64::MAX, t0),
            Err(ConfigError::ExtensionTooLarge(i64::MAX))
        );
        assert_eq!(c.absence_threshold, Duration::from_secs(5));
        assert!(!c.display_info(t0).should_display);
    }

    #[test]
    fn test_unrepresentable_seconds_are_rejected() {
        let huge = ThresholdsConfig {
            absence_seconds: 1e20,
            usage_seconds: 10.0,
            grace_period_seconds: 3.0,
        };
        assert!(matches!(
            ThresholdController::new(&huge),
            Err(ConfigError::DurationOutOfRange { .. })
        ));

        let mut c = controller();
        let patch = ThresholdsPatch {
            absence_seconds: Some(1e20),
            usage_seconds: Some(20.0),
            ..Default::default()
        };
        assert!(matches!(
            c.update(&patch),
            Err(ConfigError::DurationOutOfRange { .. })
        ));
        assert_eq!(c.absence_threshold, Duration::from_secs(5));
        assert_eq!(c.usage_threshold, Duration::from_secs(10));
    }
}

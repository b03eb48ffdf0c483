// src/error.rs

use thiserror::Error;

/// Rejected configuration or runtime setting. Returned eagerly at
/// construction or update time; the running engine is left untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("hysteresis low threshold {low} must be below high threshold {high}")]
    HysteresisOrder { low: f64, high: f64 },

    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("moving average weight_recent must be >= 1.0, got {0}")]
    InvalidWeight(f64),

    #[error("fade_out_factor must be within (0, 1], got {0}")]
    InvalidFadeFactor(f64),

    #[error("min_fps {min} must not exceed target_fps {target}")]
    RateOrder { min: f64, target: f64 },

    #[error("malformed schedule entry {entry:?}: {reason}")]
    MalformedScheduleEntry { entry: String, reason: String },

    #[error("{name} = {value} does not fit a duration")]
    DurationOutOfRange { name: &'static str, value: f64 },

    #[error("threshold extension must be positive, got {0}")]
    NonPositiveExtension(i64),

    #[error("threshold extension of {0}s exceeds the {max}s limit", max = u32::MAX)]
    ExtensionTooLarge(i64),
}

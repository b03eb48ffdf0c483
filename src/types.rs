use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detection: DetectionConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stabiliser settings. This is also the shape returned and accepted by the
/// runtime smoothing-settings API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub hysteresis: HysteresisConfig,
    pub moving_average: MovingAverageConfig,
    pub interpolation: InterpolationConfig,
    /// Object key whose stabilised output drives the smartphone state machine
    #[serde(default = "default_smartphone_key")]
    pub smartphone_key: String,
    /// Object key whose stabilised output keeps a person present through
    /// single-cycle detector dropouts
    #[serde(default = "default_person_key")]
    pub person_key: String,
}

pub type SmoothingConfig = DetectionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HysteresisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub high_threshold: f64,
    pub low_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Weight of the newest buffered detection. Required: there is no
    /// sensible universal default.
    pub weight_recent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterpolationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub max_missing_frames: u32,
    pub fade_out_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub adaptive: bool,
    pub target_fps: f64,
    pub min_fps: f64,
    pub max_skip_rate: u32,
    /// Skip rate used at start-up, and permanently when `adaptive` is off
    pub initial_skip_rate: u32,
    pub adjustment_interval_secs: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            target_fps: 15.0,
            min_fps: 10.0,
            max_skip_rate: 5,
            initial_skip_rate: 1,
            adjustment_interval_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub absence_seconds: f64,
    pub usage_seconds: f64,
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub check_interval_seconds: f64,
    pub entries: Vec<ScheduleEntryConfig>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: 10.0,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntryConfig {
    /// Local time of day, `HH:MM`
    pub time: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Upper bound on the loop cadence; the loop sleeps out the remainder
    /// of each cycle's budget.
    pub max_fps: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { max_fps: 30.0 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub webhook_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "presence_monitor=info".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_window_size() -> usize {
    5
}

fn default_grace_period() -> f64 {
    3.0
}

fn default_person_key() -> String {
    "person".to_string()
}

fn default_smartphone_key() -> String {
    "smartphone".to_string()
}

// ============================================================================
// DETECTIONS
// ============================================================================

/// Axis-aligned box in integer pixel coordinates: (x1, y1, x2, y2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox(pub i32, pub i32, pub i32, pub i32);

impl BBox {
    pub fn is_valid(&self) -> bool {
        self.2 >= self.0 && self.3 >= self.1
    }
}

/// One detector output entry, as received. Fields may be missing when the
/// detector emits a partial record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub bbox: Option<BBox>,
}

impl RawDetection {
    pub fn new(label: &str, confidence: f64, bbox: BBox) -> Self {
        Self {
            label: label.to_string(),
            confidence: Some(confidence),
            bbox: Some(bbox),
        }
    }

    /// Returns the validated form, or `None` when the entry is malformed.
    pub fn validated(&self) -> Option<StableDetection> {
        let confidence = self.confidence.filter(|c| c.is_finite())?;
        let bbox = self.bbox.filter(BBox::is_valid)?;
        Some(StableDetection {
            label: self.label.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            interpolated: false,
        })
    }
}

/// Detection as emitted by the stabiliser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableDetection {
    pub label: String,
    pub confidence: f64,
    pub bbox: BBox,
    /// Set when this entry was carried over a missed cycle with faded confidence
    pub interpolated: bool,
}

/// What the detector hands over for one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionCycleResult {
    pub person_detected: bool,
    #[serde(default)]
    pub detections: HashMap<String, Vec<RawDetection>>,
}

// ============================================================================
// STATUS
// ============================================================================

/// Countdown shown after a threshold extension
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtensionDisplay {
    pub should_display: bool,
    pub extension_amount: u32,
    pub remaining: f64,
}

/// Read-only projection of the engine state, produced once per cycle.
/// All durations are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub person_detected: bool,
    pub smartphone_detected: bool,
    pub absence_time: f64,
    pub smartphone_use_time: f64,
    pub absence_alert: bool,
    pub smartphone_alert: bool,
    pub absence_threshold: f64,
    pub smartphone_threshold: f64,
    pub smartphone_grace_period: f64,
    pub fps: f64,
    pub skip_rate: u32,
    pub extension: ExtensionDisplay,
}

/// Side effects requested from the alert collaborator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertRequest {
    Absence { duration_secs: f64 },
    Usage { duration_secs: f64 },
    Scheduled { time: String, content: String },
}

impl AlertRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertRequest::Absence { .. } => "absence",
            AlertRequest::Usage { .. } => "usage",
            AlertRequest::Scheduled { .. } => "scheduled",
        }
    }
}

// src/lib.rs

pub mod analysis;
pub mod config;
pub mod config_store;
pub mod detection;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod replay;
pub mod types;

pub use config::{SmoothingSettingsPatch, ThresholdsPatch};
pub use error::ConfigError;
pub use pipeline::{AlertDispatcher, FrameCycleCoordinator, MonitorHandle, PipelineMetrics};
pub use types::{AlertRequest, Config, DetectionCycleResult, RawDetection, StatusSnapshot};

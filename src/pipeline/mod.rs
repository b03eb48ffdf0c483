// src/pipeline/mod.rs

pub mod control;
pub mod coordinator;
pub mod dispatcher;
pub mod engine;
pub mod metrics;

pub use control::MonitorHandle;
pub use coordinator::{DetectionSource, FrameCycleCoordinator};
pub use dispatcher::{AlertDispatcher, AlertSink, ConfigStore, Outbound, OutboundSender};
pub use engine::{CycleInput, CycleOutcome, EngineState, SharedEngine};
pub use metrics::{MetricsSummary, PipelineMetrics, RateMeter};

// src/analysis/mod.rs
//
// Alert state engine.
//
// Signal flow:
//   person_detected          → presence   ─┐
//   stabilised "smartphone"  → smartphone ─┼→ AlertRequest
//   wall clock               → schedule   ─┘
//   thresholds: runtime-mutable limits read by presence / smartphone
//   inference_scheduler: decides whether the detector runs this cycle
//
// Orchestrated by pipeline::EngineState.

pub mod inference_scheduler;
pub mod presence;
pub mod schedule;
pub mod smartphone;
pub mod thresholds;

pub use inference_scheduler::{AdaptiveThrottle, SkipAdjustment, ThrottleStats};
pub use presence::{PresenceState, PresenceStateMachine};
pub use schedule::{ScheduleEntry, ScheduleGate};
pub use smartphone::{SmartphoneStateMachine, UsageState};
pub use thresholds::{ThresholdController, EXTENSION_DISPLAY_WINDOW};

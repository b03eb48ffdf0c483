// src/detection/mod.rs

mod smoother;
mod stabilizer;

// Re-export public APIs
pub use smoother::WeightedBoxSmoother;
pub use stabilizer::{DetectionStabilizer, TrackedObjectState};

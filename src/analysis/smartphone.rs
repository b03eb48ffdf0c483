// src/analysis/smartphone.rs
//
// Device-usage tracking with a grace period. A usage episode only ends once
// no positive detection has been seen for longer than the grace period, so a
// single dropped detection neither truncates the episode nor re-arms the alert.

use crate::types::AlertRequest;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageState {
    Idle,
    InUse,
    InUseAlerted,
}

pub struct SmartphoneStateMachine {
    state: UsageState,
    usage_start_at: Option<Instant>,
    last_detected_at: Option<Instant>,
    alert_active: bool,
}

impl SmartphoneStateMachine {
    pub fn new() -> Self {
        Self {
            state: UsageState::Idle,
            usage_start_at: None,
            last_detected_at: None,
            alert_active: false,
        }
    }

    /// Feed one cycle's stabilised device signal. Returns an alert request on
    /// the single transition into `InUseAlerted`.
    pub fn update(
        &mut self,
        detected: bool,
        now: Instant,
        usage_threshold: Duration,
        grace_period: Duration,
    ) -> Option<AlertRequest> {
        if detected {
            if self.state == UsageState::Idle {
                self.state = UsageState::InUse;
                self.usage_start_at = Some(now);
                debug!("📱 Usage started");
            }
            self.last_detected_at = Some(now);
        } else if self.in_use() {
            let since_last = self
                .last_detected_at
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or(Duration::MAX);
            if since_last > grace_period {
                let used_for = self.usage_duration(now);
                if self.alert_active {
                    info!(
                        "📱 Usage ended after {:.1}s, usage alert resolved",
                        used_for.as_secs_f64()
                    );
                } else {
                    debug!("📱 Usage ended after {:.1}s", used_for.as_secs_f64());
                }
                self.state = UsageState::Idle;
                self.usage_start_at = None;
                self.alert_active = false;
                return None;
            }
        }

        if self.state == UsageState::InUse {
            let used_for = self.usage_duration(now);
            if used_for > usage_threshold {
                self.state = UsageState::InUseAlerted;
                self.alert_active = true;
                warn!(
                    "🚨 Smartphone alert: in use for {:.1}s (threshold {:.1}s)",
                    used_for.as_secs_f64(),
                    usage_threshold.as_secs_f64()
                );
                return Some(AlertRequest::Usage {
                    duration_secs: used_for.as_secs_f64(),
                });
            }
        }

        None
    }

    /// Elapsed time of the current episode; zero while idle.
    pub fn usage_duration(&self, now: Instant) -> Duration {
        self.usage_start_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or(Duration::ZERO)
    }

    pub fn in_use(&self) -> bool {
        self.state != UsageState::Idle
    }

    pub fn state(&self) -> UsageState {
        self.state
    }

    pub fn alert_active(&self) -> bool {
        self.alert_active
    }

    pub fn usage_start_at(&self) -> Option<Instant> {
        self.usage_start_at
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SmartphoneStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

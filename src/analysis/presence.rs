// src/analysis/presence.rs
//
// Absence tracking. The absence episode is measured from the last time the
// person was seen, not from the first absent cycle.

use crate::types::AlertRequest;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Present,
    AbsentBelowThreshold,
    AbsentAlerted,
}

pub struct PresenceStateMachine {
    state: PresenceState,
    last_seen_at: Instant,
    absence_start_at: Option<Instant>,
    alert_active: bool,
}

impl PresenceStateMachine {
    /// Starts optimistic: the person is assumed present at `now`.
    pub fn new(now: Instant) -> Self {
        Self {
            state: PresenceState::Present,
            last_seen_at: now,
            absence_start_at: None,
            alert_active: false,
        }
    }

    /// Feed one cycle's presence signal. Returns an alert request on the
    /// single transition into `AbsentAlerted`.
    pub fn update(
        &mut self,
        present: bool,
        now: Instant,
        absence_threshold: Duration,
    ) -> Option<AlertRequest> {
        if present {
            if self.alert_active {
                info!(
                    "✅ Person back after {:.1}s, absence alert resolved",
                    self.absence_duration(now).as_secs_f64()
                );
            } else if self.state != PresenceState::Present {
                debug!("Person back");
            }
            self.state = PresenceState::Present;
            self.last_seen_at = now;
            self.absence_start_at = None;
            self.alert_active = false;
            return None;
        }

        if self.state == PresenceState::Present {
            self.state = PresenceState::AbsentBelowThreshold;
            self.absence_start_at = Some(self.last_seen_at);
            debug!("Person absent, episode started");
        }

        if self.state == PresenceState::AbsentBelowThreshold {
            let absent_for = self.absence_duration(now);
            if absent_for > absence_threshold {
                self.state = PresenceState::AbsentAlerted;
                self.alert_active = true;
                warn!(
                    "🚨 Absence alert: away for {:.1}s (threshold {:.1}s)",
                    absent_for.as_secs_f64(),
                    absence_threshold.as_secs_f64()
                );
                return Some(AlertRequest::Absence {
                    duration_secs: absent_for.as_secs_f64(),
                });
            }
        }

        None
    }

    /// Drop an active alert and re-arm the countdown for the current episode.
    pub fn clear_alert(&mut self) {
        if self.state == PresenceState::AbsentAlerted {
            self.state = PresenceState::AbsentBelowThreshold;
        }
        self.alert_active = false;
    }

    /// Time since the person was last seen; zero while present.
    pub fn absence_duration(&self, now: Instant) -> Duration {
        self.absence_start_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or(Duration::ZERO)
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn is_present(&self) -> bool {
        self.state == PresenceState::Present
    }

    pub fn alert_active(&self) -> bool {
        self.alert_active
    }

    pub fn last_seen_at(&self) -> Instant {
        self.last_seen_at
    }

    pub fn absence_start_at(&self) -> Option<Instant> {
        self.absence_start_at
    }
}

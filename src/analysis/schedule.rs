// src/analysis/schedule.rs
//
// Time-of-day reminders. Polled from the frame loop; each configured entry
// fires at most once per calendar minute no matter how often it is polled.

use crate::config::positive_seconds;
use crate::error::ConfigError;
use crate::types::{AlertRequest, ScheduleConfig};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use std::collections::HashSet;
use tracing::{debug, info};

/// Dedup set size that triggers pruning
const MAX_NOTIFIED_SLOTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub time: NaiveTime,
    pub content: String,
}

pub struct ScheduleGate {
    entries: Vec<ScheduleEntry>,
    check_interval: chrono::Duration,
    last_check: Option<NaiveDateTime>,
    notified: HashSet<String>,
}

impl ScheduleGate {
    pub fn new(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        let name = "schedule.check_interval_seconds";
        let interval = positive_seconds(name, config.check_interval_seconds)?;
        let check_interval =
            chrono::Duration::from_std(interval).map_err(|_| ConfigError::DurationOutOfRange {
                name,
                value: config.check_interval_seconds,
            })?;

        let entries = config
            .entries
            .iter()
            .map(|e| {
                let time = NaiveTime::parse_from_str(e.time.trim(), "%H:%M").map_err(|err| {
                    ConfigError::MalformedScheduleEntry {
                        entry: e.time.clone(),
                        reason: err.to_string(),
                    }
                })?;
                Ok(ScheduleEntry {
                    time,
                    content: e.content.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        if !entries.is_empty() {
            info!("✓ {} schedule entries loaded", entries.len());
        }

        Ok(Self {
            entries,
            check_interval,
            last_check: None,
            notified: HashSet::new(),
        })
    }

    /// Returns one notification request per entry due at `now` that has not
    /// fired yet this minute. Calls closer together than the check interval
    /// return nothing.
    pub fn check_if_due(&mut self, now: NaiveDateTime) -> Vec<AlertRequest> {
        if let Some(last) = self.last_check {
            // A clock stepping backwards is treated as due for a check
            if now >= last && now - last < self.check_interval {
                return Vec::new();
            }
        }
        self.last_check = Some(now);

        let minute = now.format("%Y-%m-%d %H:%M").to_string();
        if self.notified.len() > MAX_NOTIFIED_SLOTS {
            self.notified.retain(|slot| slot.starts_with(&minute));
            debug!("Schedule dedup set pruned to {}", self.notified.len());
        }

        let mut due = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.time.hour() != now.hour() || entry.time.minute() != now.minute() {
                continue;
            }
            let slot = format!("{} #{}", minute, idx);
            if !self.notified.insert(slot) {
                continue;
            }
            info!("⏰ Scheduled reminder {}: {}", entry.time.format("%H:%M"), entry.content);
            due.push(AlertRequest::Scheduled {
                time: entry.time.format("%H:%M").to_string(),
                content: entry.content.clone(),
            });
        }
        due
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScheduleEntryConfig;
    use chrono::NaiveDate;

    fn gate(interval: f64, times: &[&str]) -> ScheduleGate {
        ScheduleGate::new(&ScheduleConfig {
            check_interval_seconds: interval,
            entries: times
                .iter()
                .map(|t| ScheduleEntryConfig {
                    time: t.to_string(),
                    content: "report".to_string(),
                })
                .collect(),
        })
        .unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_one_notice_per_minute_despite_polling() {
        let mut g = gate(0.001, &["14:30"]);
        let mut fired = 0;
        for i in 0..50 {
            let now = at(14, 30, 0) + chrono::Duration::milliseconds(i * 1000);
            fired += g.check_if_due(now).len();
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_same_instant_polled_fifty_times() {
        let mut g = gate(10.0, &["14:30"]);
        let fired: usize = (0..50).map(|_| g.check_if_due(at(14, 30, 5)).len()).sum();
        assert_eq!(fired, 1);
    }

    #[test]
    fn test_notice_carries_entry() {
        let mut g = gate(10.0, &["14:30"]);
        assert!(g.check_if_due(at(14, 29, 50)).is_empty());
        assert_eq!(
            g.check_if_due(at(14, 30, 0)),
            vec![AlertRequest::Scheduled {
                time: "14:30".to_string(),
                content: "report".to_string()
            }]
        );
    }

    #[test]
    fn test_check_interval_throttles() {
        let mut g = gate(10.0, &["14:30"]);
        assert!(g.check_if_due(at(14, 29, 55)).is_empty());
        // Within 10s of the last check: not evaluated even though it is due
        assert!(g.check_if_due(at(14, 30, 1)).is_empty());
        assert_eq!(g.check_if_due(at(14, 30, 5)).len(), 1);
    }

    #[test]
    fn test_fires_again_next_day() {
        let mut g = gate(10.0, &["08:00"]);
        assert_eq!(g.check_if_due(at(8, 0, 0)).len(), 1);
        let tomorrow = at(8, 0, 0) + chrono::Duration::days(1);
        assert_eq!(g.check_if_due(tomorrow).len(), 1);
    }

    #[test]
    fn test_malformed_entry_rejected() {
        let result = ScheduleGate::new(&ScheduleConfig {
            check_interval_seconds: 10.0,
            entries: vec![ScheduleEntryConfig {
                time: "25:99".to_string(),
                content: "x".to_string(),
            }],
        });
        assert!(matches!(
            result,
            Err(ConfigError::MalformedScheduleEntry { .. })
        ));
    }

    #[test]
    fn test_dedup_set_is_pruned() {
        let mut g = gate(0.001, &[]);
        for i in 0..150 {
            g.notified.insert(format!("2026-10-18 00:00 #{}", i));
        }
        g.check_if_due(at(9, 0, 0));
        assert!(g.notified.is_empty());
    }
}

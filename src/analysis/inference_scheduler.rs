// src/analysis/inference_scheduler.rs
//
// Adaptive throttle for the detector.
// Runs detection every `skip_rate` cycles and retunes `skip_rate` from the
// measured loop rate so the pipeline stays near its target cadence.

use crate::config::positive_seconds;
use crate::error::ConfigError;
use crate::types::ThrottleConfig;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Rate above `target_fps * HEADROOM` lets the throttle run detection more often
const HEADROOM: f64 = 1.2;

/// Decides, once per cycle, whether the detector runs
pub struct AdaptiveThrottle {
    config: ThrottleConfig,
    adjustment_interval: Duration,

    /// Detection runs when `cycle_counter % skip_rate == 0`
    skip_rate: u32,

    cycle_counter: u64,

    last_adjusted_at: Instant,

    /// Times detection was allowed to run
    detection_runs: u64,

    last_adjustment: SkipAdjustment,
}

/// Outcome of the most recent retune
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipAdjustment {
    Increased,
    Decreased,
    Unchanged,
}

impl AdaptiveThrottle {
    pub fn new(config: ThrottleConfig, now: Instant) -> Result<Self, ConfigError> {
        config.validate()?;
        let adjustment_interval = positive_seconds(
            "throttle.adjustment_interval_secs",
            config.adjustment_interval_secs,
        )?;
        let skip_rate = config.initial_skip_rate.clamp(1, config.max_skip_rate.max(1));
        Ok(Self {
            config,
            adjustment_interval,
            skip_rate,
            cycle_counter: 0,
            last_adjusted_at: now,
            detection_runs: 0,
            last_adjustment: SkipAdjustment::Unchanged,
        })
    }

    /// Determine if detection should run this cycle
    ///
    /// # Arguments
    /// * `current_rate` - Measured loop rate in cycles per second
    /// * `now` - Cycle timestamp, used to pace retuning
    pub fn should_run(&mut self, current_rate: f64, now: Instant) -> bool {
        if self.config.adaptive {
            if let Some(adjustment) = self.maybe_adjust(current_rate, now) {
                self.last_adjustment = adjustment;
            }
        }

        let should_run = self.cycle_counter % self.skip_rate as u64 == 0;
        self.cycle_counter += 1;
        if should_run {
            self.detection_runs += 1;
        }
        should_run
    }

    /// Additive hill-climb, at most one step per adjustment interval.
    /// `None` when the interval has not elapsed yet.
    fn maybe_adjust(&mut self, current_rate: f64, now: Instant) -> Option<SkipAdjustment> {
        if now.saturating_duration_since(self.last_adjusted_at) < self.adjustment_interval {
            return None;
        }
        self.last_adjusted_at = now;

        let previous = self.skip_rate;
        let adjustment = if current_rate < self.config.min_fps {
            self.skip_rate = (self.skip_rate + 1).min(self.config.max_skip_rate);
            SkipAdjustment::Increased
        } else if current_rate > self.config.target_fps * HEADROOM {
            self.skip_rate = self.skip_rate.saturating_sub(1).max(1);
            SkipAdjustment::Decreased
        } else {
            SkipAdjustment::Unchanged
        };

        if self.skip_rate != previous {
            info!(
                "⏱️  Skip rate {} → {} (rate={:.1}, target={:.1}, min={:.1})",
                previous, self.skip_rate, current_rate, self.config.target_fps, self.config.min_fps
            );
            Some(adjustment)
        } else {
            debug!("⏱️  Skip rate held at {} (rate={:.1})", self.skip_rate, current_rate);
            Some(SkipAdjustment::Unchanged)
        }
    }

    pub fn skip_rate(&self) -> u32 {
        self.skip_rate
    }

    /// Get utilization statistics
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            total_cycles: self.cycle_counter,
            detection_runs: self.detection_runs,
            run_ratio: if self.cycle_counter > 0 {
                self.detection_runs as f64 / self.cycle_counter as f64
            } else {
                0.0
            },
            skip_rate: self.skip_rate,
            last_adjustment: self.last_adjustment,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.skip_rate = self
            .config
            .initial_skip_rate
            .clamp(1, self.config.max_skip_rate.max(1));
        self.cycle_counter = 0;
        self.detection_runs = 0;
        self.last_adjusted_at = now;
        self.last_adjustment = SkipAdjustment::Unchanged;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct ThrottleStats {
    pub total_cycles: u64,
    pub detection_runs: u64,
    pub run_ratio: f64,
    pub skip_rate: u32,
    pub last_adjustment: SkipAdjustment,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ThrottleConfig {
        ThrottleConfig::default()
    }

    #[test]
    fn test_defaults() {
        let c = config();
        assert_eq!(c.target_fps, 15.0);
        assert_eq!(c.min_fps, 10.0);
        assert_eq!(c.max_skip_rate, 5);
    }

    #[test]
    fn test_first_cycle_runs_and_skip_pattern() {
        let t0 = Instant::now();
        let mut c = config();
        c.adaptive = false;
        c.initial_skip_rate = 3;
        let mut throttle = AdaptiveThrottle::new(c, t0).unwrap();

        let pattern: Vec<bool> = (0..7).map(|_| throttle.should_run(15.0, t0)).collect();
        assert_eq!(pattern, vec![true, false, false, true, false, false, true]);
        assert_eq!(throttle.stats().detection_runs, 3);
    }

    #[test]
    fn test_slow_rate_increases_skip_once_per_interval() {
        let t0 = Instant::now();
        let mut throttle = AdaptiveThrottle::new(config(), t0).unwrap();

        // Many cycles inside the same interval: at most one step
        for i in 0..50 {
            throttle.should_run(5.0, t0 + Duration::from_millis(2000 + i));
        }
        assert_eq!(throttle.skip_rate(), 2);

        throttle.should_run(5.0, t0 + Duration::from_millis(4100));
        assert_eq!(throttle.skip_rate(), 3);
    }

    #[test]
    fn test_fast_rate_decreases_skip() {
        let t0 = Instant::now();
        let mut c = config();
        c.initial_skip_rate = 4;
        let mut throttle = AdaptiveThrottle::new(c, t0).unwrap();

        throttle.should_run(30.0, t0 + Duration::from_secs(2));
        assert_eq!(throttle.skip_rate(), 3);

        // Inside the 12–18 band nothing changes
        throttle.should_run(17.0, t0 + Duration::from_secs(4));
        assert_eq!(throttle.skip_rate(), 3);
    }

    #[test]
    fn test_skip_rate_bounds() {
        let t0 = Instant::now();
        let mut throttle = AdaptiveThrottle::new(config(), t0).unwrap();
        let rates = [1.0, 2.0, 3.0, 100.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 50.0, 60.0];

        let mut previous = throttle.skip_rate();
        let mut step = 0u64;
        for round in 0..10 {
            for (i, rate) in rates.iter().enumerate() {
                step += 1;
                let now = t0 + Duration::from_millis(step * 700);
                throttle.should_run(*rate + round as f64, now);
                let current = throttle.skip_rate();
                assert!((1..=5).contains(&current), "round {} idx {}", round, i);
                assert!((current as i64 - previous as i64).abs() <= 1);
                previous = current;
            }
        }
    }

    #[test]
    fn test_skip_rate_saturates() {
        let t0 = Instant::now();
        let mut throttle = AdaptiveThrottle::new(config(), t0).unwrap();
        for i in 1..=20 {
            throttle.should_run(1.0, t0 + Duration::from_secs(2 * i));
        }
        assert_eq!(throttle.skip_rate(), 5);

        for i in 21..=40 {
            throttle.should_run(100.0, t0 + Duration::from_secs(2 * i));
        }
        assert_eq!(throttle.skip_rate(), 1);
    }

    #[test]
    fn test_non_adaptive_holds_rate() {
        let t0 = Instant::now();
        let mut c = config();
        c.adaptive = false;
        c.initial_skip_rate = 2;
        let mut throttle = AdaptiveThrottle::new(c, t0).unwrap();
        for i in 1..=10 {
            throttle.should_run(1.0, t0 + Duration::from_secs(3 * i));
        }
        assert_eq!(throttle.skip_rate(), 2);
    }

    #[test]
    fn test_stats_report_last_adjustment() {
        let t0 = Instant::now();
        let mut throttle = AdaptiveThrottle::new(config(), t0).unwrap();
        assert_eq!(throttle.stats().last_adjustment, SkipAdjustment::Unchanged);

        throttle.should_run(5.0, t0 + Duration::from_secs(2));
        assert_eq!(throttle.stats().last_adjustment, SkipAdjustment::Increased);

        // Inside the interval the previous outcome is kept
        throttle.should_run(50.0, t0 + Duration::from_secs(3));
        assert_eq!(throttle.stats().last_adjustment, SkipAdjustment::Increased);

        throttle.should_run(50.0, t0 + Duration::from_secs(4));
        assert_eq!(throttle.stats().last_adjustment, SkipAdjustment::Decreased);

        throttle.reset(t0 + Duration::from_secs(5));
        assert_eq!(throttle.stats().last_adjustment, SkipAdjustment::Unchanged);
    }

    #[test]
    fn test_unrepresentable_interval_rejected() {
        let mut c = config();
        c.adjustment_interval_secs = 1e20;
        assert!(matches!(
            AdaptiveThrottle::new(c, Instant::now()),
            Err(ConfigError::DurationOutOfRange { .. })
        ));
    }
}

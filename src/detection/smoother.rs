// src/detection/smoother.rs
use crate::types::{BBox, StableDetection};
use std::collections::VecDeque;

/// Temporal smoother for one object's bounding box using a sliding window
/// where the newest entry carries extra weight.
#[derive(Debug, Clone)]
pub struct WeightedBoxSmoother {
    history: VecDeque<StableDetection>,
    window_size: usize,
    weight_recent: f64,
}

impl WeightedBoxSmoother {
    pub fn new(window_size: usize, weight_recent: f64) -> Self {
        Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
            weight_recent,
        }
    }

    /// Push an accepted detection and return the smoothed one.
    ///
    /// A single buffered entry is returned as-is, so the first observation
    /// carries no averaging artifact.
    pub fn smooth(&mut self, detection: StableDetection) -> StableDetection {
        self.history.push_back(detection);
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }

        if self.history.len() == 1 {
            return self.history[0].clone();
        }

        let newest = self.history.len() - 1;
        let mut total_weight = 0.0;
        let mut sums = [0.0f64; 4];
        let mut confidence = 0.0;

        for (i, det) in self.history.iter().enumerate() {
            let w = if i == newest { self.weight_recent } else { 1.0 };
            let BBox(x1, y1, x2, y2) = det.bbox;
            sums[0] += w * x1 as f64;
            sums[1] += w * y1 as f64;
            sums[2] += w * x2 as f64;
            sums[3] += w * y2 as f64;
            confidence += w * det.confidence;
            total_weight += w;
        }

        let latest = &self.history[newest];
        StableDetection {
            label: latest.label.clone(),
            confidence: confidence / total_weight,
            bbox: BBox(
                (sums[0] / total_weight).floor() as i32,
                (sums[1] / total_weight).floor() as i32,
                (sums[2] / total_weight).floor() as i32,
                (sums[3] / total_weight).floor() as i32,
            ),
            interpolated: false,
        }
    }

    /// Change the window in place, dropping the oldest entries if it shrank.
    pub fn resize(&mut self, window_size: usize) {
        self.window_size = window_size;
        while self.history.len() > window_size {
            self.history.pop_front();
        }
        self.history
            .reserve(window_size.saturating_sub(self.history.len()));
    }

    pub fn set_weight_recent(&mut self, weight_recent: f64) {
        self.weight_recent = weight_recent;
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    pub fn history_size(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: BBox, confidence: f64) -> StableDetection {
        StableDetection {
            label: "smartphone".to_string(),
            confidence,
            bbox,
            interpolated: false,
        }
    }

    #[test]
    fn test_first_observation_is_identity() {
        let mut smoother = WeightedBoxSmoother::new(5, 2.0);
        let input = det(BBox(10, 10, 20, 20), 0.8);
        assert_eq!(smoother.smooth(input.clone()), input);
    }

    #[test]
    fn test_recent_weight_pulls_towards_newest() {
        let mut smoother = WeightedBoxSmoother::new(5, 3.0);
        smoother.smooth(det(BBox(0, 0, 10, 10), 0.6));
        let out = smoother.smooth(det(BBox(4, 4, 14, 14), 1.0));

        // (0*1 + 4*3) / 4 = 3 ; (10*1 + 14*3) / 4 = 13
        assert_eq!(out.bbox, BBox(3, 3, 13, 13));
        assert!((out.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_coordinates_are_floored() {
        let mut smoother = WeightedBoxSmoother::new(5, 1.0);
        smoother.smooth(det(BBox(0, 0, 10, 10), 0.5));
        let out = smoother.smooth(det(BBox(1, 1, 11, 11), 0.5));
        // 0.5 → 0 ; 10.5 → 10
        assert_eq!(out.bbox, BBox(0, 0, 10, 10));
    }

    #[test]
    fn test_window_is_bounded_and_resizable() {
        let mut smoother = WeightedBoxSmoother::new(3, 1.0);
        for i in 0..10 {
            smoother.smooth(det(BBox(i, i, i + 5, i + 5), 0.9));
        }
        assert_eq!(smoother.history_size(), 3);

        smoother.resize(1);
        assert_eq!(smoother.history_size(), 1);
        let out = smoother.smooth(det(BBox(50, 50, 60, 60), 0.7));
        assert_eq!(out.bbox, BBox(50, 50, 60, 60));
    }
}

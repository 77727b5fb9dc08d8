//! Streaming heart-rate estimate from raw ECG samples.
//!
//! This is a coarse threshold-count heuristic, **not** an R-R interval
//! detector, and it is not suitable for diagnosis.  Over a window of the last
//! [`WINDOW_LEN`] samples (0.5 s at 100 Hz) it counts how many exceed
//! [`R_PEAK_THRESHOLD_MV`], scales the count by [`BPM_PER_PEAK`], and clamps the
//! result to `[MIN_BPM, MAX_BPM]`.  The constants are kept as-is so estimates
//! stay comparable with previously recorded sessions.

use std::collections::VecDeque;

use crate::types::Bpm;

/// Number of most recent samples considered.
pub const WINDOW_LEN: usize = 50;

/// A sample strictly above this value counts as part of an R peak.
pub const R_PEAK_THRESHOLD_MV: f64 = 1.5;

/// BPM contributed by each above-threshold sample in the window.
pub const BPM_PER_PEAK: u32 = 6;

pub const MIN_BPM: Bpm = 50;
pub const MAX_BPM: Bpm = 180;

/// One estimator per monitoring session.
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    window: VecDeque<f64>,
    current: Bpm,
}

impl Default for HeartRateEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartRateEstimator {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_LEN + 1),
            current: MIN_BPM,
        }
    }

    /// Feed one sample and return the updated estimate.
    pub fn push(&mut self, mv: f64) -> Bpm {
        self.window.push_back(mv);
        while self.window.len() > WINDOW_LEN {
            self.window.pop_front();
        }

        // NaN compares false, so garbage samples never count as peaks.
        let peaks = self.window.iter().filter(|&&v| v > R_PEAK_THRESHOLD_MV).count() as u32;
        let raw = peaks.saturating_mul(BPM_PER_PEAK);
        self.current = raw.clamp(MIN_BPM as u32, MAX_BPM as u32) as Bpm;
        self.current
    }

    /// The estimate after the most recent [`push`](Self::push);
    /// [`MIN_BPM`] before any sample arrives.
    pub fn current(&self) -> Bpm {
        self.current
    }

    /// Samples currently held (never more than [`WINDOW_LEN`]).
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.current = MIN_BPM;
    }
}

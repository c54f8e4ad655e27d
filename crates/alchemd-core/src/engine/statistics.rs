use super::config::{ConfigError, TuningConfig};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Attempted and accepted trial counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCounts {
    pub attempted: u64,
    pub accepted: u64,
}

impl MoveCounts {
    pub fn rejected(&self) -> u64 {
        self.attempted.saturating_sub(self.accepted)
    }

    /// Fraction of attempts that were accepted; zero before the first attempt.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

impl AddAssign for MoveCounts {
    fn add_assign(&mut self, other: Self) {
        self.attempted += other.attempted;
        self.accepted += other.accepted;
    }
}

/// Acceptance bookkeeping and the adaptive move size of one shape move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MoveStatistics {
    pub attempted: u64,
    pub accepted: u64,
    pub move_size: f64,
    /// Attempts since the last tuning adjustment.
    #[serde(default)]
    pub window_attempted: u64,
    #[serde(default)]
    pub window_accepted: u64,
}

impl MoveStatistics {
    pub fn new(move_size: f64) -> Self {
        Self {
            attempted: 0,
            accepted: 0,
            move_size,
            window_attempted: 0,
            window_accepted: 0,
        }
    }

    /// Checks counters and move size loaded from outside, e.g. from a checkpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accepted > self.attempted {
            return Err(ConfigError::invalid(
                "accepted",
                format!(
                    "{} accepted trials exceed {} attempted",
                    self.accepted, self.attempted
                ),
            ));
        }
        if self.window_accepted > self.window_attempted {
            return Err(ConfigError::invalid(
                "window_accepted",
                format!(
                    "{} accepted trials exceed {} attempted in the tuning window",
                    self.window_accepted, self.window_attempted
                ),
            ));
        }
        if self.window_attempted > self.attempted {
            return Err(ConfigError::invalid(
                "window_attempted",
                format!(
                    "tuning window of {} attempts exceeds the {} attempted overall",
                    self.window_attempted, self.attempted
                ),
            ));
        }
        if !(self.move_size.is_finite() && self.move_size > 0.0) {
            return Err(ConfigError::invalid(
                "move_size",
                format!("must be positive and finite, got {}", self.move_size),
            ));
        }
        Ok(())
    }

    pub fn record(&mut self, accepted: bool) {
        self.attempted += 1;
        self.window_attempted += 1;
        if accepted {
            self.accepted += 1;
            self.window_accepted += 1;
        }
    }

    pub fn counts(&self) -> MoveCounts {
        MoveCounts {
            attempted: self.attempted,
            accepted: self.accepted,
        }
    }

    pub fn acceptance_ratio(&self) -> f64 {
        self.counts().acceptance_ratio()
    }

    /// Rescales the move size once a full tuning window has been observed.
    ///
    /// The factor is the window's acceptance ratio over the target, clamped to
    /// `[1/max_scale_adjustment, max_scale_adjustment]`; the resulting size is clamped to
    /// `[min_move_size, max_move_size]`. Returns the new size when an adjustment was made.
    pub fn tune(&mut self, tuning: &TuningConfig) -> Option<f64> {
        if self.window_attempted < tuning.tune_interval {
            return None;
        }
        let ratio = self.window_accepted as f64 / self.window_attempted as f64;
        let bound = tuning.max_scale_adjustment;
        let factor = (ratio / tuning.target_acceptance_ratio).clamp(1.0 / bound, bound);

        self.move_size =
            (self.move_size * factor).clamp(tuning.min_move_size, tuning.max_move_size);
        self.window_attempted = 0;
        self.window_accepted = 0;
        Some(self.move_size)
    }
}

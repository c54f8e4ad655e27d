use crate::core::manifold::ManifoldError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("Invalid manifold: {0}")]
    Manifold(#[from] ManifoldError),
}

impl ConfigError {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            parameter,
            reason: reason.into(),
        }
    }
}

fn require_positive(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            parameter,
            format!("must be positive and finite, got {}", value),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlchemostatConfig {
    /// Primary timesteps per alchemical step for the integrator's own schedule.
    pub period: u64,
    /// Primary timestep size; an alchemical step advances by `period * dt`.
    pub dt: f64,
}

impl AlchemostatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period == 0 {
            return Err(ConfigError::invalid("period", "must be at least 1"));
        }
        require_positive("dt", self.dt)
    }
}

#[derive(Default)]
pub struct AlchemostatConfigBuilder {
    period: Option<u64>,
    dt: Option<f64>,
}

impl AlchemostatConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period(mut self, period: u64) -> Self {
        self.period = Some(period);
        self
    }
    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn build(self) -> Result<AlchemostatConfig, ConfigError> {
        let config = AlchemostatConfig {
            period: self.period.ok_or(ConfigError::MissingParameter("period"))?,
            dt: self.dt.ok_or(ConfigError::MissingParameter("dt"))?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Adaptive move-size tuning toward a target acceptance ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningConfig {
    pub target_acceptance_ratio: f64,
    /// Attempts per tuning window.
    pub tune_interval: u64,
    /// Upper bound on the multiplicative change applied at the end of one window.
    pub max_scale_adjustment: f64,
    pub min_move_size: f64,
    pub max_move_size: f64,
}

impl TuningConfig {
    pub const DEFAULT_TUNE_INTERVAL: u64 = 100;
    pub const DEFAULT_MAX_SCALE_ADJUSTMENT: f64 = 1.5;
    pub const DEFAULT_MIN_MOVE_SIZE: f64 = 1e-6;
    pub const DEFAULT_MAX_MOVE_SIZE: f64 = 10.0;

    pub fn new(target_acceptance_ratio: f64) -> Self {
        Self {
            target_acceptance_ratio,
            tune_interval: Self::DEFAULT_TUNE_INTERVAL,
            max_scale_adjustment: Self::DEFAULT_MAX_SCALE_ADJUSTMENT,
            min_move_size: Self::DEFAULT_MIN_MOVE_SIZE,
            max_move_size: Self::DEFAULT_MAX_MOVE_SIZE,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let target = self.target_acceptance_ratio;
        if !(target > 0.0 && target < 1.0) {
            return Err(ConfigError::invalid(
                "target_acceptance_ratio",
                format!("must lie strictly between 0 and 1, got {}", target),
            ));
        }
        if self.tune_interval == 0 {
            return Err(ConfigError::invalid("tune_interval", "must be at least 1"));
        }
        if !(self.max_scale_adjustment.is_finite() && self.max_scale_adjustment > 1.0) {
            return Err(ConfigError::invalid(
                "max_scale_adjustment",
                format!("must be finite and greater than 1, got {}", self.max_scale_adjustment),
            ));
        }
        require_positive("min_move_size", self.min_move_size)?;
        require_positive("max_move_size", self.max_move_size)?;
        if self.min_move_size > self.max_move_size {
            return Err(ConfigError::invalid(
                "min_move_size",
                format!(
                    "{} exceeds max_move_size {}",
                    self.min_move_size, self.max_move_size
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeUpdaterConfig {
    /// Thermal energy `kT` of the Metropolis test.
    pub temperature: f64,
    /// Initial move-size scale of moves added without an explicit one.
    pub move_size_scale: f64,
    /// `None` disables adaptive tuning.
    pub tuning: Option<TuningConfig>,
}

impl ShapeUpdaterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("temperature", self.temperature)?;
        require_positive("move_size_scale", self.move_size_scale)?;
        if let Some(tuning) = &self.tuning {
            tuning.validate()?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ShapeUpdaterConfigBuilder {
    temperature: Option<f64>,
    move_size_scale: Option<f64>,
    target_acceptance_ratio: Option<f64>,
    tune_interval: Option<u64>,
    max_scale_adjustment: Option<f64>,
    min_move_size: Option<f64>,
    max_move_size: Option<f64>,
}

impl ShapeUpdaterConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, kt: f64) -> Self {
        self.temperature = Some(kt);
        self
    }
    pub fn move_size_scale(mut self, scale: f64) -> Self {
        self.move_size_scale = Some(scale);
        self
    }
    pub fn target_acceptance_ratio(mut self, ratio: f64) -> Self {
        self.target_acceptance_ratio = Some(ratio);
        self
    }
    pub fn tune_interval(mut self, attempts: u64) -> Self {
        self.tune_interval = Some(attempts);
        self
    }
    pub fn max_scale_adjustment(mut self, factor: f64) -> Self {
        self.max_scale_adjustment = Some(factor);
        self
    }
    pub fn min_move_size(mut self, size: f64) -> Self {
        self.min_move_size = Some(size);
        self
    }
    pub fn max_move_size(mut self, size: f64) -> Self {
        self.max_move_size = Some(size);
        self
    }

    /// Tuning is enabled only when a target acceptance ratio is given; the remaining tuning
    /// knobs fall back to the [`TuningConfig`] defaults.
    pub fn build(self) -> Result<ShapeUpdaterConfig, ConfigError> {
        let tuning = self.target_acceptance_ratio.map(|target| {
            let defaults = TuningConfig::new(target);
            TuningConfig {
                target_acceptance_ratio: target,
                tune_interval: self.tune_interval.unwrap_or(defaults.tune_interval),
                max_scale_adjustment: self
                    .max_scale_adjustment
                    .unwrap_or(defaults.max_scale_adjustment),
                min_move_size: self.min_move_size.unwrap_or(defaults.min_move_size),
                max_move_size: self.max_move_size.unwrap_or(defaults.max_move_size),
            }
        });
        let config = ShapeUpdaterConfig {
            temperature: self
                .temperature
                .ok_or(ConfigError::MissingParameter("temperature"))?,
            move_size_scale: self
                .move_size_scale
                .ok_or(ConfigError::MissingParameter("move_size_scale"))?,
            tuning,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionConfig {
    /// Largest `|g(x)|` accepted as lying on the surface.
    pub constraint_tolerance: f64,
    pub max_projection_iterations: usize,
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("constraint_tolerance", self.constraint_tolerance)?;
        if self.max_projection_iterations == 0 {
            return Err(ConfigError::invalid(
                "max_projection_iterations",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            constraint_tolerance: 1e-6,
            max_projection_iterations: 50,
        }
    }
}

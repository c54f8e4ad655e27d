use alchemd::engine::config::{ProjectionConfig, TuningConfig};

pub struct DefaultsConfig {
    pub seed: u64,
    pub steps: u64,
    pub trial_interval: u64,
    pub tether: f64,
    pub alchemostat_period: u64,
    pub dt: f64,
    pub temperature: f64,
    pub move_size_scale: f64,
    pub tune_interval: u64,
    pub max_scale_adjustment: f64,
    pub min_move_size: f64,
    pub max_move_size: f64,
    pub constraint_tolerance: f64,
    pub max_projection_iterations: usize,
    pub dof_mass: f64,
    pub dof_period: u64,
    pub move_probability: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        let projection = ProjectionConfig::default();
        Self {
            seed: 0,
            steps: 1000,
            trial_interval: 1,
            tether: 0.0,
            alchemostat_period: 1,
            dt: 0.005,
            temperature: 1.0,
            move_size_scale: 0.1,
            tune_interval: TuningConfig::DEFAULT_TUNE_INTERVAL,
            max_scale_adjustment: TuningConfig::DEFAULT_MAX_SCALE_ADJUSTMENT,
            min_move_size: TuningConfig::DEFAULT_MIN_MOVE_SIZE,
            max_move_size: TuningConfig::DEFAULT_MAX_MOVE_SIZE,
            constraint_tolerance: projection.constraint_tolerance,
            max_projection_iterations: projection.max_projection_iterations,
            dof_mass: 1.0,
            dof_period: 1,
            move_probability: 1.0,
        }
    }
}

use super::defaults::DefaultsConfig;
use super::file::{
    FileConfig, FileDof, FileManifoldConfig, FileMove, FileMoveKind, FileUpdaterConfig,
};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use alchemd::core::manifold::{ManifoldKind, ManifoldSpec};
use alchemd::core::models::dof::{DofSpec, DofTarget};
use alchemd::core::moves::Domain;
use alchemd::engine::config::{
    AlchemostatConfigBuilder, ProjectionConfig, ShapeUpdaterConfig, ShapeUpdaterConfigBuilder,
};
use alchemd::workflows::sandbox::{MoveKind, SandboxConfig, SandboxDof, SandboxMove};
use nalgebra::Point3;
use std::str::FromStr;

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::from_file(&args.config)?;
    let file_config = apply_set_values(file_config, &args.set_values)?;

    let seed = args.seed.or(file_config.seed).unwrap_or(defaults.seed);
    let steps = args.steps.or(file_config.steps).unwrap_or(defaults.steps);

    let alchemostat_file = file_config.alchemostat.clone().unwrap_or_default();
    let alchemostat = AlchemostatConfigBuilder::new()
        .period(alchemostat_file.period.unwrap_or(defaults.alchemostat_period))
        .dt(alchemostat_file.dt.unwrap_or(defaults.dt))
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    let projection_file = file_config.projection.clone().unwrap_or_default();
    let projection = ProjectionConfig {
        constraint_tolerance: projection_file
            .constraint_tolerance
            .unwrap_or(defaults.constraint_tolerance),
        max_projection_iterations: projection_file
            .max_projection_iterations
            .unwrap_or(defaults.max_projection_iterations),
    };

    let updater = if file_config.updater.is_some() || !file_config.moves.is_empty() {
        Some(merge_updater(
            file_config.updater.clone().unwrap_or_default(),
            &defaults,
        )?)
    } else {
        None
    };

    let manifold = file_config
        .manifold
        .clone()
        .map(merge_manifold)
        .transpose()?;

    let dofs = file_config
        .dofs
        .iter()
        .map(|dof| merge_dof(dof, &defaults))
        .collect::<Result<Vec<_>>>()?;
    let moves = file_config
        .moves
        .iter()
        .map(|m| merge_move(m, &defaults))
        .collect::<Result<Vec<_>>>()?;

    let sandbox = SandboxConfig {
        seed,
        positions: file_config
            .positions
            .unwrap_or_default()
            .into_iter()
            .map(Point3::from)
            .collect(),
        tether: file_config.tether.unwrap_or(defaults.tether),
        manifold,
        projection,
        alchemostat,
        updater,
        trial_interval: file_config
            .trial_interval
            .unwrap_or(defaults.trial_interval),
        dofs,
        moves,
    };
    sandbox
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(AppConfig {
        sandbox,
        steps,
        checkpoint_path: args.checkpoint.clone(),
        resume_path: args.resume.clone(),
        show_progress: !args.no_progress,
    })
}

fn merge_updater(file: FileUpdaterConfig, defaults: &DefaultsConfig) -> Result<ShapeUpdaterConfig> {
    let mut builder = ShapeUpdaterConfigBuilder::new()
        .temperature(file.temperature.unwrap_or(defaults.temperature))
        .move_size_scale(file.move_size_scale.unwrap_or(defaults.move_size_scale))
        .tune_interval(file.tune_interval.unwrap_or(defaults.tune_interval))
        .max_scale_adjustment(
            file.max_scale_adjustment
                .unwrap_or(defaults.max_scale_adjustment),
        )
        .min_move_size(file.min_move_size.unwrap_or(defaults.min_move_size))
        .max_move_size(file.max_move_size.unwrap_or(defaults.max_move_size));
    if let Some(target) = file.target_acceptance_ratio {
        builder = builder.target_acceptance_ratio(target);
    }
    builder.build().map_err(|e| CliError::Config(e.to_string()))
}

fn merge_manifold(file: FileManifoldConfig) -> Result<ManifoldSpec> {
    Ok(ManifoldSpec {
        kind: file.kind.unwrap_or(ManifoldKind::Gyroid),
        n: file.n.unwrap_or([1, 1, 1]),
        box_lengths: file
            .box_lengths
            .ok_or_else(|| CliError::Config("`manifold` requires `box-lengths`".to_string()))?,
        epsilon: file.epsilon.unwrap_or(0.0),
    })
}

fn parse_target(target: &str) -> Result<DofTarget> {
    DofTarget::from_str(target).map_err(|_| {
        CliError::Config(format!(
            "Invalid target '{}'. Expected 'particle:<tag>' or 'type:<name>'.",
            target
        ))
    })
}

fn merge_dof(file: &FileDof, defaults: &DefaultsConfig) -> Result<SandboxDof> {
    let spec = DofSpec::new(parse_target(&file.target)?, file.parameter.clone(), file.value)
        .with_momentum(file.momentum.unwrap_or(0.0))
        .with_mass(file.mass.unwrap_or(defaults.dof_mass))
        .with_period(file.period.unwrap_or(defaults.dof_period));
    Ok(SandboxDof {
        spec,
        stiffness: file.stiffness.unwrap_or(0.0),
        center: file.center.unwrap_or(file.value),
        integrate: file.integrate,
        breathing: file.breathing,
    })
}

fn merge_move(file: &FileMove, defaults: &DefaultsConfig) -> Result<SandboxMove> {
    let dofs = file
        .dofs
        .iter()
        .map(|reference| {
            let (target, parameter) = reference.rsplit_once('/').ok_or_else(|| {
                CliError::Config(format!(
                    "Move '{}': invalid reference '{}'. Expected '<target>/<parameter>'.",
                    file.name, reference
                ))
            })?;
            Ok((parse_target(target)?, parameter.trim().to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let kind = match &file.kind {
        FileMoveKind::RandomWalk {
            min,
            max,
            move_probability,
        } => MoveKind::RandomWalk {
            domain: Domain::new(
                min.unwrap_or(f64::NEG_INFINITY),
                max.unwrap_or(f64::INFINITY),
            )
            .map_err(|e| CliError::Config(format!("Move '{}': {}", file.name, e)))?,
            move_probability: move_probability.unwrap_or(defaults.move_probability),
        },
        FileMoveKind::Delta { values } => MoveKind::Delta(values.clone()),
        FileMoveKind::Target { values } => MoveKind::Target(values.clone()),
        FileMoveKind::Elastic {
            stiffness,
            reference,
            move_probability,
        } => MoveKind::Elastic {
            stiffness: *stiffness,
            reference: reference.clone(),
            move_probability: move_probability.unwrap_or(defaults.move_probability),
        },
        FileMoveKind::Vertex {
            volume,
            move_probability,
        } => MoveKind::Vertex {
            volume: *volume,
            move_probability: move_probability.unwrap_or(defaults.move_probability),
        },
    };

    Ok(SandboxMove {
        name: file.name.clone(),
        dofs,
        kind,
        initial_scale: file.initial_scale,
    })
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let (key, value_str) = kv_pair.split_once('=').ok_or_else(|| {
            CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            ))
        })?;
        let key = key.trim();

        match key {
            "seed" => config.seed = Some(parse_value(key, value_str, "integer")?),
            "steps" => config.steps = Some(parse_value(key, value_str, "integer")?),
            "trial-interval" => {
                config.trial_interval = Some(parse_value(key, value_str, "integer")?)
            }
            "tether" => config.tether = Some(parse_value(key, value_str, "float")?),
            "alchemostat.period" => {
                config
                    .alchemostat
                    .get_or_insert_with(Default::default)
                    .period = Some(parse_value(key, value_str, "integer")?);
            }
            "alchemostat.dt" => {
                config.alchemostat.get_or_insert_with(Default::default).dt =
                    Some(parse_value(key, value_str, "float")?);
            }
            "updater.temperature" => {
                config
                    .updater
                    .get_or_insert_with(Default::default)
                    .temperature = Some(parse_value(key, value_str, "float")?);
            }
            "updater.move-size-scale" => {
                config
                    .updater
                    .get_or_insert_with(Default::default)
                    .move_size_scale = Some(parse_value(key, value_str, "float")?);
            }
            "updater.target-acceptance-ratio" => {
                config
                    .updater
                    .get_or_insert_with(Default::default)
                    .target_acceptance_ratio = Some(parse_value(key, value_str, "float")?);
            }
            "updater.tune-interval" => {
                config
                    .updater
                    .get_or_insert_with(Default::default)
                    .tune_interval = Some(parse_value(key, value_str, "integer")?);
            }
            "projection.constraint-tolerance" => {
                config
                    .projection
                    .get_or_insert_with(Default::default)
                    .constraint_tolerance = Some(parse_value(key, value_str, "float")?);
            }
            "projection.max-projection-iterations" => {
                config
                    .projection
                    .get_or_insert_with(Default::default)
                    .max_projection_iterations = Some(parse_value(key, value_str, "integer")?);
            }
            "manifold.epsilon" => {
                config
                    .manifold
                    .get_or_insert_with(Default::default)
                    .epsilon = Some(parse_value(key, value_str, "float")?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

use crate::core::manifold::ManifoldSpec;
use crate::core::models::dof::{DofSpec, DofTarget};
use crate::core::models::ids::DofId;
use crate::core::moves::constant::ConstantShapeMove;
use crate::core::moves::elastic::ElasticShapeMove;
use crate::core::moves::external::ExternalShapeMove;
use crate::core::moves::vertex::VertexShapeMove;
use crate::core::moves::{Domain, ProposalError, ShapeMove};
use crate::engine::alchemostat::{AlchemostatIntegrator, IntegrationMethod};
use crate::engine::checkpoint::{CHECKPOINT_VERSION, Checkpoint, CheckpointError};
use crate::engine::comm::Communicator;
use crate::engine::config::{AlchemostatConfig, ConfigError, ProjectionConfig, ShapeUpdaterConfig};
use crate::engine::constraint::ManifoldConstraint;
use crate::engine::context::{ParticleState, ParticleUpdate, SimulationContext, TrialOverrides};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::registry::AlchemicalDofRegistry;
use crate::engine::statistics::{MoveCounts, MoveStatistics};
use crate::engine::updater::ShapeUpdater;
use nalgebra::{Point3, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const TRIAL_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// One alchemical degree of freedom of the sandbox and the harmonic well it sits in.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxDof {
    pub spec: DofSpec,
    /// Stiffness `k` of the well `½k(λ − λ₀)²`; zero disables the well.
    pub stiffness: f64,
    pub center: f64,
    /// Whether the alchemostat integrates this degree of freedom.
    pub integrate: bool,
    /// Whether the value scales every particle position about the origin. At most one degree of
    /// freedom may breathe, and it is sampled by shape moves only.
    pub breathing: bool,
}

impl SandboxDof {
    pub fn new(spec: DofSpec) -> Self {
        Self {
            spec,
            stiffness: 0.0,
            center: 0.0,
            integrate: false,
            breathing: false,
        }
    }

    pub fn with_well(mut self, stiffness: f64, center: f64) -> Self {
        self.stiffness = stiffness;
        self.center = center;
        self
    }

    pub fn integrated(mut self) -> Self {
        self.integrate = true;
        self
    }

    pub fn breathing(mut self) -> Self {
        self.breathing = true;
        self
    }
}

/// The generator a sandbox shape move is built from.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveKind {
    RandomWalk {
        domain: Domain,
        move_probability: f64,
    },
    Delta(Vec<f64>),
    Target(Vec<f64>),
    Elastic {
        stiffness: f64,
        reference: Vec<f64>,
        move_probability: f64,
    },
    /// Random walk renormalized so that the product of the values stays at `volume`.
    Vertex {
        volume: f64,
        move_probability: f64,
    },
}

impl MoveKind {
    fn build(&self) -> Result<Box<dyn ShapeMove>, ProposalError> {
        let generator: Box<dyn ShapeMove> = match self {
            MoveKind::RandomWalk {
                domain,
                move_probability,
            } => Box::new(
                ExternalShapeMove::random_walk(*domain).with_move_probability(*move_probability)?,
            ),
            MoveKind::Delta(delta) => Box::new(ConstantShapeMove::delta(delta.clone())?),
            MoveKind::Target(target) => Box::new(ConstantShapeMove::target(target.clone())?),
            MoveKind::Elastic {
                stiffness,
                reference,
                move_probability,
            } => Box::new(ElasticShapeMove::new(
                *stiffness,
                reference.clone(),
                *move_probability,
            )?),
            MoveKind::Vertex {
                volume,
                move_probability,
            } => Box::new(VertexShapeMove::new(*volume, *move_probability)?),
        };
        Ok(generator)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxMove {
    pub name: String,
    /// The `(target, parameter)` pairs the move perturbs.
    pub dofs: Vec<(DofTarget, String)>,
    pub kind: MoveKind,
    pub initial_scale: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Seed of the per-timestep random streams used by shape-move trials.
    pub seed: u64,
    pub positions: Vec<Point3<f64>>,
    /// Stiffness of the harmonic tether `½κ|r|²` holding every particle near the origin.
    pub tether: f64,
    pub manifold: Option<ManifoldSpec>,
    pub projection: ProjectionConfig,
    pub alchemostat: AlchemostatConfig,
    pub updater: Option<ShapeUpdaterConfig>,
    /// Primary timesteps between shape-move trials.
    pub trial_interval: u64,
    pub dofs: Vec<SandboxDof>,
    pub moves: Vec<SandboxMove>,
}

impl SandboxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trial_interval == 0 {
            return Err(ConfigError::invalid("trial_interval", "must be at least 1"));
        }
        if !(self.tether.is_finite() && self.tether >= 0.0) {
            return Err(ConfigError::invalid(
                "tether",
                format!("must be non-negative and finite, got {}", self.tether),
            ));
        }
        if let Some(index) = self
            .positions
            .iter()
            .position(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(ConfigError::invalid(
                "positions",
                format!("particle {} has a non-finite coordinate", index),
            ));
        }

        let mut breathing = self.dofs.iter().filter(|d| d.breathing);
        if let Some(dof) = breathing.next() {
            if breathing.next().is_some() {
                return Err(ConfigError::invalid(
                    "dofs",
                    "at most one degree of freedom may breathe",
                ));
            }
            if dof.integrate {
                return Err(ConfigError::invalid(
                    "dofs",
                    "the breathing degree of freedom cannot be integrated",
                ));
            }
            if !(dof.spec.value > 0.0) {
                return Err(ConfigError::invalid(
                    "dofs",
                    format!("breathing scale must be positive, got {}", dof.spec.value),
                ));
            }
        }
        if !self.moves.is_empty() && self.updater.is_none() {
            return Err(ConfigError::MissingParameter("updater"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Well {
    dof: DofId,
    stiffness: f64,
    center: f64,
}

/// The worker-local part of a closed system of tethered particles with harmonic wells on its
/// alchemical values.
///
/// Particles are distributed round-robin over the workers; the wells are accounted on the root
/// only, so that reduced energies and forces count every term exactly once.
#[derive(Debug, Clone)]
pub struct SandboxSystem {
    positions: Vec<Point3<f64>>,
    velocities: Vec<Vector3<f64>>,
    tether: f64,
    wells: Vec<Well>,
    breathing: Option<DofId>,
    reference_scale: f64,
}

impl SandboxSystem {
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.velocities
    }

    /// The breathing value the current particle positions correspond to.
    pub fn reference_scale(&self) -> f64 {
        self.reference_scale
    }

    fn breathing_value(&self, registry: &AlchemicalDofRegistry) -> Option<f64> {
        self.breathing
            .and_then(|id| registry.get(id).ok())
            .map(|s| s.value)
    }
}

impl ParticleState for SandboxSystem {
    fn num_particles(&self) -> usize {
        self.positions.len()
    }

    fn position(&self, index: usize) -> Point3<f64> {
        self.positions[index]
    }

    fn velocity(&self, index: usize) -> Vector3<f64> {
        self.velocities[index]
    }

    fn set_position(&mut self, index: usize, position: Point3<f64>) {
        self.positions[index] = position;
    }

    fn set_velocity(&mut self, index: usize, velocity: Vector3<f64>) {
        self.velocities[index] = velocity;
    }
}

impl SimulationContext for SandboxSystem {
    fn local_energy(
        &self,
        registry: &AlchemicalDofRegistry,
        overrides: Option<&TrialOverrides>,
    ) -> f64 {
        let wells: f64 = self
            .wells
            .iter()
            .map(|w| {
                let value = registry.get(w.dof).map_or(w.center, |s| s.value);
                0.5 * w.stiffness * (value - w.center).powi(2)
            })
            .sum();
        let tether: f64 = (0..self.positions.len())
            .map(|i| {
                let r = match overrides {
                    Some(o) => o.position_or(self, i),
                    None => self.positions[i],
                };
                0.5 * self.tether * r.coords.norm_squared()
            })
            .sum();
        wells + tether
    }

    fn local_generalized_force(&self, registry: &AlchemicalDofRegistry, dof: DofId) -> f64 {
        self.wells
            .iter()
            .filter(|w| w.dof == dof)
            .map(|w| {
                let value = registry.get(w.dof).map_or(w.center, |s| s.value);
                -w.stiffness * (value - w.center)
            })
            .sum()
    }

    fn trial_displacements(&self, registry: &AlchemicalDofRegistry) -> Vec<ParticleUpdate> {
        let Some(scale) = self.breathing_value(registry) else {
            return Vec::new();
        };
        if scale.to_bits() == self.reference_scale.to_bits() {
            return Vec::new();
        }
        let ratio = scale / self.reference_scale;
        self.positions
            .iter()
            .zip(&self.velocities)
            .enumerate()
            .map(|(index, (r, v))| ParticleUpdate {
                index,
                position: Point3::from(r.coords * ratio),
                velocity: *v,
            })
            .collect()
    }

    fn commit_trial(&mut self, registry: &AlchemicalDofRegistry, overrides: &TrialOverrides) {
        for update in overrides.updates() {
            self.positions[update.index] = update.position;
            self.velocities[update.index] = update.velocity;
        }
        if let Some(scale) = self.breathing_value(registry) {
            self.reference_scale = scale;
        }
    }
}

/// Velocity Verlet for unit-mass particles in the harmonic tether, with RATTLE style projection
/// onto an optional manifold after the drift.
#[derive(Debug, Clone)]
pub struct ManifoldNve {
    dt: f64,
    tether: f64,
    constraint: Option<ManifoldConstraint>,
}

impl ManifoldNve {
    pub fn new(dt: f64, tether: f64, constraint: Option<ManifoldConstraint>) -> Self {
        Self {
            dt,
            tether,
            constraint,
        }
    }

    pub fn constraint(&self) -> Option<&ManifoldConstraint> {
        self.constraint.as_ref()
    }
}

impl IntegrationMethod for ManifoldNve {
    fn integrate(
        &mut self,
        _timestep: u64,
        context: &mut dyn SimulationContext,
        _registry: &mut AlchemicalDofRegistry,
        comm: &dyn Communicator,
    ) -> Result<(), EngineError> {
        let n = context.num_particles();
        let half = 0.5 * self.dt;

        for i in 0..n {
            let r = context.position(i);
            let v = context.velocity(i) - r.coords * (self.tether * half);
            context.set_velocity(i, v);
            context.set_position(i, r + v * self.dt);
        }

        let projected = match &self.constraint {
            Some(constraint) => constraint.constrain_particles(&mut *context, 0..n),
            None => Ok(()),
        };
        if comm.any(projected.is_err()) {
            projected?;
            return Err(EngineError::InvalidState(
                "particle projection failed on another worker".to_string(),
            ));
        }

        for i in 0..n {
            let r = context.position(i);
            let mut v = context.velocity(i) - r.coords * (self.tether * half);
            if let Some(constraint) = &self.constraint {
                v = constraint.tangential_velocity(&r, &v);
            }
            context.set_velocity(i, v);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParticleRecord {
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

/// The engine checkpoint plus the sandbox's own particle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SandboxCheckpoint {
    pub seed: u64,
    pub reference_scale: f64,
    pub alchemical: Checkpoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub particles: Vec<ParticleRecord>,
}

impl SandboxCheckpoint {
    pub fn to_toml_string(&self) -> Result<String, CheckpointError> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CheckpointError> {
        let checkpoint: SandboxCheckpoint = toml::from_str(content)?;
        if checkpoint.alchemical.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: checkpoint.alchemical.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(checkpoint)
    }

    pub fn write(&self, path: &Path) -> Result<(), CheckpointError> {
        std::fs::write(path, self.to_toml_string()?).map_err(|e| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })
    }

    pub fn read(path: &Path) -> Result<Self, CheckpointError> {
        let content = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub start_timestep: u64,
    /// The first timestep not run.
    pub end_timestep: u64,
    /// Primary timesteps on which at least one alchemostat group fired.
    pub firing_steps: u64,
    pub trials: MoveCounts,
    pub potential_energy: f64,
    pub alchemical_kinetic_energy: f64,
    /// `(target/parameter, value)` for every degree of freedom.
    pub values: Vec<(String, f64)>,
    pub statistics: Vec<(String, MoveStatistics)>,
}

/// A fully wired sandbox: particles, registry, alchemostat, shape updater, and the particle
/// integrator, advanced together one primary timestep at a time.
#[derive(Debug)]
pub struct Sandbox {
    system: SandboxSystem,
    registry: AlchemicalDofRegistry,
    alchemostat: AlchemostatIntegrator,
    particles: ManifoldNve,
    updater: Option<ShapeUpdater>,
    seed: u64,
    trial_interval: u64,
    timestep: u64,
}

impl Sandbox {
    /// Builds the part of the sandbox owned by the calling worker.
    pub fn new(config: &SandboxConfig, comm: &dyn Communicator) -> Result<Self, EngineError> {
        config.validate()?;

        let constraint = match &config.manifold {
            Some(spec) => Some(ManifoldConstraint::new(spec.build()?, config.projection)?),
            None => None,
        };

        let mut registry = AlchemicalDofRegistry::new();
        let mut alchemostat = AlchemostatIntegrator::new(config.alchemostat)?;
        let mut wells = Vec::new();
        let mut breathing = None;
        for dof in &config.dofs {
            let id = registry.attach(dof.spec.clone())?;
            if dof.stiffness != 0.0 && comm.is_root() {
                wells.push(Well {
                    dof: id,
                    stiffness: dof.stiffness,
                    center: dof.center,
                });
            }
            if dof.integrate {
                alchemostat.add_dof(&registry, id)?;
            }
            if dof.breathing {
                breathing = Some(id);
            }
        }

        let (rank, size) = (comm.rank(), comm.size().max(1));
        let positions: Vec<_> = config
            .positions
            .iter()
            .enumerate()
            .filter(|(tag, _)| tag % size == rank)
            .map(|(_, p)| *p)
            .collect();
        let reference_scale = breathing
            .and_then(|id| registry.get(id).ok())
            .map_or(1.0, |s| s.value);
        let mut system = SandboxSystem {
            velocities: vec![Vector3::zeros(); positions.len()],
            positions,
            tether: config.tether,
            wells,
            breathing,
            reference_scale,
        };
        if let Some(constraint) = &constraint {
            let n = system.num_particles();
            constraint.constrain_particles(&mut system, 0..n)?;
        }

        let updater = match (&config.updater, config.moves.is_empty()) {
            (Some(updater_config), false) => {
                let mut updater = ShapeUpdater::new(*updater_config)?;
                if let Some(constraint) = &constraint {
                    updater = updater.with_constraint(constraint.clone());
                }
                for shape_move in &config.moves {
                    let ids = resolve_dofs(&registry, shape_move)?;
                    let generator = shape_move.kind.build().map_err(|e| {
                        ConfigError::invalid("moves", format!("'{}': {}", shape_move.name, e))
                    })?;
                    updater.add_move(
                        &registry,
                        shape_move.name.clone(),
                        ids,
                        generator,
                        shape_move.initial_scale,
                    )?;
                }
                Some(updater)
            }
            _ => None,
        };

        debug!(
            rank,
            particles = system.num_particles(),
            dofs = registry.len(),
            "Built sandbox"
        );
        Ok(Self {
            system,
            registry,
            alchemostat,
            particles: ManifoldNve::new(config.alchemostat.dt, config.tether, constraint),
            updater,
            seed: config.seed,
            trial_interval: config.trial_interval,
            timestep: 0,
        })
    }

    /// Builds the sandbox and continues from `checkpoint`. The checkpoint's seed takes
    /// precedence over the configured one.
    pub fn resume(
        config: &SandboxConfig,
        checkpoint: &SandboxCheckpoint,
        comm: &dyn Communicator,
    ) -> Result<Self, EngineError> {
        let mut sandbox = Self::new(config, comm)?;
        checkpoint.alchemical.restore_into(
            &mut sandbox.registry,
            Some(&mut sandbox.alchemostat),
            sandbox.updater.as_mut(),
        )?;

        if checkpoint.particles.len() != sandbox.system.num_particles() {
            return Err(CheckpointError::Mismatch(format!(
                "checkpoint holds {} particles, the sandbox has {}",
                checkpoint.particles.len(),
                sandbox.system.num_particles()
            ))
            .into());
        }
        for (i, record) in checkpoint.particles.iter().enumerate() {
            sandbox.system.positions[i] = Point3::from(record.position);
            sandbox.system.velocities[i] = Vector3::from(record.velocity);
        }
        sandbox.system.reference_scale = checkpoint.reference_scale;

        if checkpoint.seed != config.seed {
            warn!(
                configured = config.seed,
                checkpoint = checkpoint.seed,
                "Using the seed stored in the checkpoint"
            );
        }
        sandbox.seed = checkpoint.seed;
        sandbox.timestep = checkpoint.alchemical.timestep;
        Ok(sandbox)
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub fn system(&self) -> &SandboxSystem {
        &self.system
    }

    pub fn registry(&self) -> &AlchemicalDofRegistry {
        &self.registry
    }

    pub fn alchemostat(&self) -> &AlchemostatIntegrator {
        &self.alchemostat
    }

    pub fn updater(&self) -> Option<&ShapeUpdater> {
        self.updater.as_ref()
    }

    /// Advances the sandbox by `steps` primary timesteps.
    ///
    /// Each timestep integrates the particles, fires the alchemostat groups that are due, and
    /// attempts one shape-move trial every `trial_interval` timesteps. Every worker must call
    /// this with the same arguments.
    #[instrument(skip_all, name = "sandbox_workflow", fields(start = self.timestep, steps = steps))]
    pub fn run(
        &mut self,
        steps: u64,
        comm: &dyn Communicator,
        reporter: &ProgressReporter,
    ) -> Result<RunReport, EngineError> {
        reporter.report(Progress::RunStart { total_steps: steps });
        info!("Starting sandbox run.");

        let start = self.timestep;
        let mut firing_steps = 0;
        let mut trials = MoveCounts::default();

        for timestep in start..start + steps {
            self.particles
                .integrate(timestep, &mut self.system, &mut self.registry, comm)?;

            if self
                .alchemostat
                .step(timestep, &self.system, &mut self.registry, comm)?
            {
                firing_steps += 1;
                reporter.report(Progress::AlchemicalFiring { timestep });
            }

            if let Some(updater) = self.updater.as_mut() {
                if timestep % self.trial_interval == 0 {
                    let mut rng = trial_rng(self.seed, timestep);
                    let accepted =
                        updater.update(&mut self.system, &mut self.registry, comm, &mut rng)?;
                    trials += MoveCounts {
                        attempted: 1,
                        accepted: u64::from(accepted),
                    };
                    reporter.report(Progress::TrialFinished { accepted });
                }
            }

            self.timestep = timestep + 1;
            reporter.report(Progress::StepFinished { timestep });
        }

        let report = RunReport {
            start_timestep: start,
            end_timestep: self.timestep,
            firing_steps,
            trials,
            potential_energy: comm
                .all_reduce_sum(self.system.local_energy(&self.registry, None)),
            alchemical_kinetic_energy: self.alchemostat.alchemical_kinetic_energy(&self.registry),
            values: self
                .registry
                .iter()
                .map(|(_, dof)| (format!("{}/{}", dof.target, dof.parameter), dof.value))
                .collect(),
            statistics: self
                .updater
                .as_ref()
                .map(|u| {
                    u.statistics()
                        .into_iter()
                        .map(|(name, stats)| (name.to_string(), stats.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        };

        reporter.report(Progress::RunFinish);
        info!(
            end = report.end_timestep,
            potential_energy = report.potential_energy,
            accepted = report.trials.accepted,
            attempted = report.trials.attempted,
            "Sandbox run complete."
        );
        Ok(report)
    }

    pub fn checkpoint(&self) -> SandboxCheckpoint {
        SandboxCheckpoint {
            seed: self.seed,
            reference_scale: self.system.reference_scale,
            alchemical: Checkpoint::capture(
                self.timestep,
                &self.registry,
                Some(&self.alchemostat),
                self.updater.as_ref(),
            ),
            particles: self
                .system
                .positions
                .iter()
                .zip(&self.system.velocities)
                .map(|(r, v)| ParticleRecord {
                    position: [r.x, r.y, r.z],
                    velocity: [v.x, v.y, v.z],
                })
                .collect(),
        }
    }
}

fn resolve_dofs(
    registry: &AlchemicalDofRegistry,
    shape_move: &SandboxMove,
) -> Result<Vec<DofId>, ConfigError> {
    shape_move
        .dofs
        .iter()
        .map(|(target, parameter)| {
            registry.find(target, parameter).ok_or_else(|| {
                ConfigError::invalid(
                    "moves",
                    format!(
                        "'{}' refers to parameter '{}' of {}, which is not declared",
                        shape_move.name, parameter, target
                    ),
                )
            })
        })
        .collect()
}

/// The random stream for the trial at `timestep`. Seeding per timestep keeps a resumed run
/// bit-identical to an uninterrupted one.
fn trial_rng(seed: u64, timestep: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ timestep.wrapping_mul(TRIAL_SEED_MIX))
}

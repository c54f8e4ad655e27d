use super::error::EngineError;
use super::registry::AlchemicalDofRegistry;
use crate::core::models::ids::DofId;
use nalgebra::{Point3, Vector3};

/// Read and write access to the particles owned by one worker.
pub trait ParticleState {
    fn num_particles(&self) -> usize;
    fn position(&self, index: usize) -> Point3<f64>;
    fn velocity(&self, index: usize) -> Vector3<f64>;
    fn set_position(&mut self, index: usize, position: Point3<f64>);
    fn set_velocity(&mut self, index: usize, velocity: Vector3<f64>);
}

/// The new phase-space point a trial would impose on one particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleUpdate {
    pub index: usize,
    pub position: Point3<f64>,
    pub velocity: Vector3<f64>,
}

/// Particle updates that a Monte Carlo trial evaluates without applying.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialOverrides {
    updates: Vec<ParticleUpdate>,
}

impl TrialOverrides {
    pub fn new(updates: Vec<ParticleUpdate>) -> Self {
        Self { updates }
    }

    pub fn updates(&self) -> &[ParticleUpdate] {
        &self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ParticleUpdate> {
        self.updates.iter().find(|u| u.index == index)
    }

    /// The trial position of a particle, falling back to its persistent one.
    pub fn position_or<S: ParticleState + ?Sized>(&self, state: &S, index: usize) -> Point3<f64> {
        self.get(index)
            .map(|u| u.position)
            .unwrap_or_else(|| state.position(index))
    }
}

/// The host simulation as seen by the alchemical machinery.
///
/// All quantities are the contributions of the calling worker only; the engine performs the
/// collective reductions itself, so implementations must never reduce across workers.
pub trait SimulationContext: ParticleState {
    /// The local potential energy, optionally under trial particle overrides. Alchemical values
    /// are read from `registry`, which holds trial values while a trial is in flight.
    fn local_energy(
        &self,
        registry: &AlchemicalDofRegistry,
        overrides: Option<&TrialOverrides>,
    ) -> f64;

    /// The local contribution to the generalized force `-∂U/∂λ` on one degree of freedom.
    fn local_generalized_force(&self, registry: &AlchemicalDofRegistry, dof: DofId) -> f64;

    /// Particle updates implied by the alchemical values currently held in `registry`, for
    /// systems whose shape moves also move particles.
    fn trial_displacements(&self, _registry: &AlchemicalDofRegistry) -> Vec<ParticleUpdate> {
        Vec::new()
    }

    /// Makes an accepted trial's particle updates persistent. `registry` already holds the
    /// accepted values.
    fn commit_trial(&mut self, _registry: &AlchemicalDofRegistry, overrides: &TrialOverrides) {
        for update in overrides.updates() {
            self.set_position(update.index, update.position);
            self.set_velocity(update.index, update.velocity);
        }
    }
}

/// The local generalized force on `dof` by central differences of the local energy.
///
/// Useful for contexts whose potential has no analytic derivative in the alchemical value.
pub fn central_difference_force<C>(
    context: &C,
    registry: &AlchemicalDofRegistry,
    dof: DofId,
    step: f64,
) -> Result<f64, EngineError>
where
    C: SimulationContext + ?Sized,
{
    let value = registry.get(dof)?.value;
    let mut probe = registry.clone();

    probe.set_value(dof, value + step)?;
    let forward = context.local_energy(&probe, None);
    probe.set_value(dof, value - step)?;
    let backward = context.local_energy(&probe, None);

    Ok(-(forward - backward) / (2.0 * step))
}

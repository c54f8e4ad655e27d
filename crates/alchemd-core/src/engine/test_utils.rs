use super::context::{ParticleState, ParticleUpdate, SimulationContext, TrialOverrides};
use super::registry::AlchemicalDofRegistry;
use crate::core::models::ids::DofId;
use nalgebra::{Point3, Vector3};

/// Independent harmonic wells `½k(λ − λ₀)²` on alchemical values, plus an optional harmonic
/// tether `½κ|r|²` on every particle.
#[derive(Debug, Clone, Default)]
pub struct HarmonicContext {
    pub wells: Vec<(DofId, f64, f64)>,
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub tether: f64,
    pub energy_offset: f64,
    pub displacements: Vec<ParticleUpdate>,
    pub commits: usize,
}

impl HarmonicContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_well(mut self, dof: DofId, stiffness: f64, center: f64) -> Self {
        self.wells.push((dof, stiffness, center));
        self
    }

    pub fn with_particles(mut self, positions: Vec<Point3<f64>>) -> Self {
        self.velocities = vec![Vector3::zeros(); positions.len()];
        self.positions = positions;
        self
    }
}

impl ParticleState for HarmonicContext {
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

impl SimulationContext for HarmonicContext {
    fn local_energy(
        &self,
        registry: &AlchemicalDofRegistry,
        overrides: Option<&TrialOverrides>,
    ) -> f64 {
        let wells: f64 = self
            .wells
            .iter()
            .map(|&(id, k, center)| {
                let value = registry.get(id).map(|s| s.value).unwrap_or(center);
                0.5 * k * (value - center).powi(2)
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
        wells + tether + self.energy_offset
    }

    fn local_generalized_force(&self, registry: &AlchemicalDofRegistry, dof: DofId) -> f64 {
        self.wells
            .iter()
            .filter(|(id, _, _)| *id == dof)
            .map(|&(id, k, center)| {
                let value = registry.get(id).map(|s| s.value).unwrap_or(center);
                -k * (value - center)
            })
            .sum()
    }

    fn trial_displacements(&self, _registry: &AlchemicalDofRegistry) -> Vec<ParticleUpdate> {
        self.displacements.clone()
    }

    fn commit_trial(&mut self, _registry: &AlchemicalDofRegistry, overrides: &TrialOverrides) {
        for update in overrides.updates() {
            self.positions[update.index] = update.position;
            self.velocities[update.index] = update.velocity;
        }
        self.commits += 1;
    }
}

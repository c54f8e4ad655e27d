use super::comm::Communicator;
use super::config::{AlchemostatConfig, ConfigError};
use super::context::SimulationContext;
use super::error::EngineError;
use super::registry::{AlchemicalDofRegistry, RegistryPhase};
use crate::core::models::ids::DofId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, instrument, warn};

/// Where a firing stood when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringPhase {
    /// Before the first half-kick.
    Idle,
    /// After the first half-kick.
    Kicked,
    /// After the drift.
    Drifted,
}

impl fmt::Display for FiringPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FiringPhase::Idle => "idle",
            FiringPhase::Kicked => "kicked",
            FiringPhase::Drifted => "drifted",
        };
        f.write_str(name)
    }
}

/// The multi-rate schedule of one group of degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AlchemostatState {
    pub period: u64,
    pub next_timestep: u64,
    pub firings: u64,
}

impl AlchemostatState {
    /// A schedule whose first firing is the smallest multiple of `period` not before `timestep`.
    pub fn aligned(period: u64, timestep: u64) -> Self {
        Self {
            period,
            next_timestep: align_up(timestep, period),
            firings: 0,
        }
    }

    pub fn is_due(&self, timestep: u64) -> bool {
        timestep >= self.next_timestep
    }

    fn record_firing(&mut self, timestep: u64) {
        if timestep > self.next_timestep {
            warn!(
                period = self.period,
                scheduled = self.next_timestep,
                timestep,
                "Alchemical step fired late; realigning schedule"
            );
        }
        self.firings += 1;
        self.next_timestep = timestep + self.period;
    }

    fn advance_to(&mut self, timestep: u64) {
        if self.next_timestep < timestep {
            let behind = timestep - self.next_timestep;
            self.next_timestep += behind.div_ceil(self.period) * self.period;
        }
    }
}

fn align_up(timestep: u64, period: u64) -> u64 {
    timestep.div_ceil(period) * period
}

/// A time integrator that advances part of the simulation state by one primary timestep.
///
/// Integrators are composed side by side rather than layered; the host calls each method it
/// holds once per timestep.
pub trait IntegrationMethod {
    fn integrate(
        &mut self,
        timestep: u64,
        context: &mut dyn SimulationContext,
        registry: &mut AlchemicalDofRegistry,
        comm: &dyn Communicator,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
struct DofGroup {
    state: AlchemostatState,
    dofs: Vec<DofId>,
}

/// Velocity-Verlet integration of alchemical values and their momenta.
///
/// Degrees of freedom are grouped by their multi-rate factor. A group with period `n` fires on
/// every `n`-th primary timestep and then advances with an effective timestep of `n·dt`. The
/// group with the configured period always exists, even while empty, so that its schedule can
/// be inspected and controlled before any degree of freedom is added.
#[derive(Debug, Clone)]
pub struct AlchemostatIntegrator {
    config: AlchemostatConfig,
    groups: BTreeMap<u64, DofGroup>,
    current_timestep: u64,
}

impl AlchemostatIntegrator {
    pub fn new(config: AlchemostatConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut groups = BTreeMap::new();
        groups.insert(
            config.period,
            DofGroup {
                state: AlchemostatState::aligned(config.period, 0),
                dofs: Vec::new(),
            },
        );
        Ok(Self {
            config,
            groups,
            current_timestep: 0,
        })
    }

    pub fn period(&self) -> u64 {
        self.config.period
    }

    pub fn timestep_size(&self) -> f64 {
        self.config.dt
    }

    pub fn config(&self) -> &AlchemostatConfig {
        &self.config
    }

    /// Every integrated degree of freedom, grouped by increasing period.
    pub fn dofs(&self) -> Vec<DofId> {
        self.groups
            .values()
            .flat_map(|g| g.dofs.iter().copied())
            .collect()
    }

    pub fn contains(&self, id: DofId) -> bool {
        self.groups.values().any(|g| g.dofs.contains(&id))
    }

    pub fn schedules(&self) -> Vec<AlchemostatState> {
        self.groups.values().map(|g| g.state).collect()
    }

    pub fn next_alchemical_timestep(&self, period: u64) -> Option<u64> {
        self.groups.get(&period).map(|g| g.state.next_timestep)
    }

    /// The first primary timestep the integrator has not yet been stepped through.
    pub fn current_timestep(&self) -> u64 {
        self.current_timestep
    }

    pub fn add_dof(
        &mut self,
        registry: &AlchemicalDofRegistry,
        id: DofId,
    ) -> Result<(), EngineError> {
        let period = registry.dof(id)?.period;
        if self.contains(id) {
            return Err(EngineError::InvalidState(format!(
                "{:?} is already integrated by the alchemostat",
                id
            )));
        }
        let current = self.current_timestep;
        self.groups
            .entry(period)
            .or_insert_with(|| {
                debug!(period, "Creating alchemostat group");
                DofGroup {
                    state: AlchemostatState::aligned(period, current),
                    dofs: Vec::new(),
                }
            })
            .dofs
            .push(id);
        Ok(())
    }

    pub fn remove_dof(&mut self, id: DofId) -> Result<(), EngineError> {
        let period = self
            .groups
            .iter()
            .find(|(_, g)| g.dofs.contains(&id))
            .map(|(&period, _)| period)
            .ok_or(EngineError::DofNotFound(id))?;

        let primary = self.config.period;
        if let Some(group) = self.groups.get_mut(&period) {
            group.dofs.retain(|&d| d != id);
            if group.dofs.is_empty() && period != primary {
                self.groups.remove(&period);
            }
        }
        Ok(())
    }

    /// Re-derives every schedule as the smallest multiple of its period not before `timestep`.
    pub fn resynchronize(&mut self, timestep: u64) {
        for group in self.groups.values_mut() {
            group.state.next_timestep = align_up(timestep, group.state.period);
        }
        self.current_timestep = timestep;
    }

    /// Moves every schedule forward by whole periods until it is not before `timestep`.
    pub fn advance_schedule(&mut self, timestep: u64) {
        for group in self.groups.values_mut() {
            group.state.advance_to(timestep);
        }
        self.current_timestep = self.current_timestep.max(timestep);
    }

    pub fn set_next_alchemical_timestep(&mut self, timestep: u64) {
        for group in self.groups.values_mut() {
            group.state.next_timestep = timestep;
        }
    }

    /// Overwrites the schedule of the group with the same period, e.g. from a checkpoint.
    pub fn restore_schedule(&mut self, state: AlchemostatState) -> Result<(), EngineError> {
        let group = self.groups.get_mut(&state.period).ok_or_else(|| {
            EngineError::InvalidState(format!(
                "no alchemostat group with period {} to restore",
                state.period
            ))
        })?;
        group.state = state;
        Ok(())
    }

    pub(crate) fn set_current_timestep(&mut self, timestep: u64) {
        self.current_timestep = timestep;
    }

    /// Kinetic energy `Σ p²/2m` of the integrated degrees of freedom.
    pub fn alchemical_kinetic_energy(&self, registry: &AlchemicalDofRegistry) -> f64 {
        self.groups
            .values()
            .flat_map(|g| g.dofs.iter())
            .filter_map(|&id| registry.dof(id).ok())
            .map(|dof| dof.kinetic_energy())
            .sum()
    }

    /// Fires every group that is due at `timestep`; returns whether any group fired.
    pub fn step<C>(
        &mut self,
        timestep: u64,
        context: &C,
        registry: &mut AlchemicalDofRegistry,
        comm: &dyn Communicator,
    ) -> Result<bool, EngineError>
    where
        C: SimulationContext + ?Sized,
    {
        let due: Vec<u64> = self
            .groups
            .iter()
            .filter(|(_, g)| g.state.is_due(timestep))
            .map(|(&period, _)| period)
            .collect();

        let mut fired = false;
        for period in due {
            let Some(group) = self.groups.get_mut(&period) else {
                continue;
            };
            if !group.dofs.is_empty() {
                let dt = period as f64 * self.config.dt;
                registry.begin(RegistryPhase::Step)?;
                let result = fire(&group.dofs, dt, timestep, context, registry, comm);
                registry.end();
                result?;
                fired = true;
            }
            group.state.record_firing(timestep);
        }

        self.current_timestep = self.current_timestep.max(timestep + 1);
        Ok(fired)
    }
}

impl IntegrationMethod for AlchemostatIntegrator {
    fn integrate(
        &mut self,
        timestep: u64,
        context: &mut dyn SimulationContext,
        registry: &mut AlchemicalDofRegistry,
        comm: &dyn Communicator,
    ) -> Result<(), EngineError> {
        self.step(timestep, &*context, registry, comm).map(|_| ())
    }
}

fn diverged(
    dof: DofId,
    timestep: u64,
    phase: FiringPhase,
    quantity: &'static str,
    value: f64,
) -> EngineError {
    EngineError::IntegrationDiverged {
        dof,
        timestep,
        phase,
        quantity,
        value,
    }
}

fn reduced_forces<C>(
    dofs: &[DofId],
    timestep: u64,
    phase: FiringPhase,
    context: &C,
    registry: &AlchemicalDofRegistry,
    comm: &dyn Communicator,
) -> Result<Vec<f64>, EngineError>
where
    C: SimulationContext + ?Sized,
{
    dofs.iter()
        .map(|&id| {
            let force = comm.all_reduce_sum(context.local_generalized_force(registry, id));
            if force.is_finite() {
                Ok(force)
            } else {
                Err(diverged(id, timestep, phase, "generalized force", force))
            }
        })
        .collect()
}

#[instrument(level = "debug", skip_all, fields(timestep = timestep, dofs = dofs.len()))]
fn fire<C>(
    dofs: &[DofId],
    dt: f64,
    timestep: u64,
    context: &C,
    registry: &mut AlchemicalDofRegistry,
    comm: &dyn Communicator,
) -> Result<(), EngineError>
where
    C: SimulationContext + ?Sized,
{
    // 1. Half-kick with the forces at the current values, then drift.
    let forces = reduced_forces(dofs, timestep, FiringPhase::Idle, context, registry, comm)?;
    for (&id, force) in dofs.iter().zip(forces) {
        let dof = registry.dof(id)?;
        let momentum = dof.momentum + 0.5 * dt * force;
        if !momentum.is_finite() {
            return Err(diverged(id, timestep, FiringPhase::Kicked, "momentum", momentum));
        }
        let value = dof.value + dt * momentum / dof.mass;
        if !value.is_finite() {
            return Err(diverged(id, timestep, FiringPhase::Drifted, "value", value));
        }
        registry.write_dynamics(id, value, momentum)?;
    }

    // 2. Second half-kick with the forces at the drifted values.
    let forces = reduced_forces(dofs, timestep, FiringPhase::Drifted, context, registry, comm)?;
    for (&id, force) in dofs.iter().zip(forces) {
        let dof = registry.dof(id)?;
        let momentum = dof.momentum + 0.5 * dt * force;
        if !momentum.is_finite() {
            return Err(diverged(id, timestep, FiringPhase::Drifted, "momentum", momentum));
        }
        let value = dof.value;
        registry.write_dynamics(id, value, momentum)?;
    }

    debug!(timestep, dt, "Alchemical step complete");
    Ok(())
}

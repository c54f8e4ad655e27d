use super::config::ConfigError;
use super::error::EngineError;
use crate::core::models::dof::{AlchemicalDof, DofSnapshot, DofSpec, DofTarget};
use crate::core::models::ids::DofId;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// What the registry is currently being used for.
///
/// Membership changes are only legal while the registry is [`RegistryPhase::Idle`]; a Monte
/// Carlo trial or an alchemostat firing holds the registry in the corresponding phase until it
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryPhase {
    #[default]
    Idle,
    Trial,
    Step,
}

impl fmt::Display for RegistryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryPhase::Idle => "idle",
            RegistryPhase::Trial => "trial",
            RegistryPhase::Step => "step",
        };
        f.write_str(name)
    }
}

/// The authoritative set of alchemical degrees of freedom.
///
/// Handles are generational, so a handle to a detached degree of freedom is never mistaken for
/// a later one. Iteration follows slot order and is identical on every worker that performed
/// the same sequence of attachments.
#[derive(Debug, Clone, Default)]
pub struct AlchemicalDofRegistry {
    dofs: SlotMap<DofId, AlchemicalDof>,
    by_key: HashMap<(DofTarget, String), DofId>,
    phase: RegistryPhase,
}

impl AlchemicalDofRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, spec: DofSpec) -> Result<DofId, EngineError> {
        self.ensure_idle("attach")?;
        validate_spec(&spec)?;

        let key = (spec.target.clone(), spec.parameter.clone());
        if self.by_key.contains_key(&key) {
            return Err(EngineError::DuplicateDof {
                target: spec.target,
                parameter: spec.parameter,
            });
        }

        let id = self.dofs.insert(AlchemicalDof::from_spec(spec));
        self.by_key.insert(key, id);
        debug!(?id, "Attached alchemical degree of freedom");
        Ok(id)
    }

    pub fn detach(&mut self, id: DofId) -> Result<AlchemicalDof, EngineError> {
        self.ensure_idle("detach")?;
        let dof = self.dofs.remove(id).ok_or(EngineError::DofNotFound(id))?;
        self.by_key.remove(&(dof.target.clone(), dof.parameter.clone()));
        debug!(?id, "Detached alchemical degree of freedom");
        Ok(dof)
    }

    pub fn get(&self, id: DofId) -> Result<DofSnapshot, EngineError> {
        self.dof(id).map(AlchemicalDof::snapshot)
    }

    pub fn dof(&self, id: DofId) -> Result<&AlchemicalDof, EngineError> {
        self.dofs.get(id).ok_or(EngineError::DofNotFound(id))
    }

    pub fn set_value(&mut self, id: DofId, value: f64) -> Result<(), EngineError> {
        require_finite("value", value)?;
        self.dof_mut(id)?.value = value;
        Ok(())
    }

    pub fn set_momentum(&mut self, id: DofId, momentum: f64) -> Result<(), EngineError> {
        require_finite("momentum", momentum)?;
        self.dof_mut(id)?.momentum = momentum;
        Ok(())
    }

    /// Writes both halves of the phase-space point without validation; the integrator checks
    /// finiteness itself so that it can report the failing phase.
    pub(crate) fn write_dynamics(
        &mut self,
        id: DofId,
        value: f64,
        momentum: f64,
    ) -> Result<(), EngineError> {
        let dof = self.dof_mut(id)?;
        dof.value = value;
        dof.momentum = momentum;
        Ok(())
    }

    pub fn find(&self, target: &DofTarget, parameter: &str) -> Option<DofId> {
        self.by_key
            .get(&(target.clone(), parameter.to_string()))
            .copied()
    }

    pub fn contains(&self, id: DofId) -> bool {
        self.dofs.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = DofId> + '_ {
        self.dofs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DofId, &AlchemicalDof)> {
        self.dofs.iter()
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    pub fn phase(&self) -> RegistryPhase {
        self.phase
    }

    pub(crate) fn begin(&mut self, phase: RegistryPhase) -> Result<(), EngineError> {
        if self.phase != RegistryPhase::Idle {
            return Err(EngineError::InvalidState(format!(
                "cannot start a {} while a {} is in flight",
                phase, self.phase
            )));
        }
        self.phase = phase;
        Ok(())
    }

    pub(crate) fn end(&mut self) {
        self.phase = RegistryPhase::Idle;
    }

    fn dof_mut(&mut self, id: DofId) -> Result<&mut AlchemicalDof, EngineError> {
        self.dofs.get_mut(id).ok_or(EngineError::DofNotFound(id))
    }

    /// Direct access for restoring saved values; a detached handle yields `None`.
    pub(crate) fn slot_mut(&mut self, id: DofId) -> Option<&mut AlchemicalDof> {
        self.dofs.get_mut(id)
    }

    fn ensure_idle(&self, operation: &str) -> Result<(), EngineError> {
        if self.phase == RegistryPhase::Idle {
            Ok(())
        } else {
            Err(EngineError::InvalidState(format!(
                "cannot {} while a {} is in flight",
                operation, self.phase
            )))
        }
    }
}

fn require_finite(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            parameter,
            format!("must be finite, got {}", value),
        ))
    }
}

fn validate_spec(spec: &DofSpec) -> Result<(), ConfigError> {
    if spec.parameter.trim().is_empty() {
        return Err(ConfigError::invalid("parameter", "name must not be empty"));
    }
    if !(spec.mass.is_finite() && spec.mass > 0.0) {
        return Err(ConfigError::invalid(
            "mass",
            format!("must be positive and finite, got {}", spec.mass),
        ));
    }
    if spec.period == 0 {
        return Err(ConfigError::invalid("period", "must be at least 1"));
    }
    require_finite("value", spec.value)?;
    require_finite("momentum", spec.momentum)
}

use super::error::EngineError;
use super::registry::{AlchemicalDofRegistry, RegistryPhase};
use crate::core::models::ids::DofId;

/// A scoped trial modification of alchemical values.
///
/// Opening a transaction moves the registry into [`RegistryPhase::Trial`]. Every value written
/// through it is recorded first, so a revert restores the exact bit patterns that were there
/// before. A transaction that is dropped without being committed reverts itself.
pub struct TrialTransaction<'r> {
    registry: &'r mut AlchemicalDofRegistry,
    saved: Vec<(DofId, f64)>,
    finished: bool,
}

impl<'r> TrialTransaction<'r> {
    pub fn begin(registry: &'r mut AlchemicalDofRegistry) -> Result<Self, EngineError> {
        registry.begin(RegistryPhase::Trial)?;
        Ok(Self {
            registry,
            saved: Vec::new(),
            finished: false,
        })
    }

    pub fn registry(&self) -> &AlchemicalDofRegistry {
        self.registry
    }

    pub fn set_values(&mut self, ids: &[DofId], values: &[f64]) -> Result<(), EngineError> {
        if ids.len() != values.len() {
            return Err(EngineError::Internal(format!(
                "{} trial values supplied for {} degrees of freedom",
                values.len(),
                ids.len()
            )));
        }
        for (&id, &value) in ids.iter().zip(values) {
            // 1. Record the original value the first time this degree of freedom is touched.
            if !self.saved.iter().any(|(saved, _)| *saved == id) {
                let original = self.registry.get(id)?.value;
                self.saved.push((id, original));
            }
            // 2. Apply the trial value.
            self.registry.set_value(id, value)?;
        }
        Ok(())
    }

    pub fn commit(mut self) {
        self.finished = true;
        self.registry.end();
    }

    pub fn revert(mut self) {
        self.rollback();
    }

    fn rollback(&mut self) {
        for (id, value) in self.saved.drain(..).rev() {
            if let Some(dof) = self.registry.slot_mut(id) {
                dof.value = value;
            }
        }
        self.finished = true;
        self.registry.end();
    }
}

impl Drop for TrialTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.rollback();
        }
    }
}

use super::alchemostat::{AlchemostatIntegrator, AlchemostatState};
use super::error::EngineError;
use super::registry::AlchemicalDofRegistry;
use super::statistics::MoveStatistics;
use super::updater::ShapeUpdater;
use crate::core::models::dof::{DofSpec, DofTarget};
use crate::core::models::ids::DofId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TOML serialization error: {source}")]
    Serialize {
        #[from]
        source: toml::ser::Error,
    },
    #[error("TOML parsing error: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },
    #[error("Unsupported checkpoint version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("Checkpoint does not match the running system: {0}")]
    Mismatch(String),
}

/// The persisted state of one alchemical degree of freedom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DofRecord {
    pub parameter: String,
    pub value: f64,
    pub momentum: f64,
    pub mass: f64,
    pub period: u64,
    /// Whether the alchemostat integrates this degree of freedom.
    #[serde(default)]
    pub integrated: bool,
    pub target: DofTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MoveRecord {
    pub name: String,
    pub statistics: MoveStatistics,
}

/// Everything needed to continue a run bit-identically: alchemical phase-space points, the
/// multi-rate schedules, and the acceptance statistics that drive move-size tuning.
///
/// Shape moves themselves are not persisted; a restored run re-registers them under the same
/// names before their statistics are restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Checkpoint {
    pub version: u32,
    /// The first primary timestep that has not been run yet.
    pub timestep: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dofs: Vec<DofRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schedules: Vec<AlchemostatState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moves: Vec<MoveRecord>,
}

impl Checkpoint {
    pub fn capture(
        timestep: u64,
        registry: &AlchemicalDofRegistry,
        integrator: Option<&AlchemostatIntegrator>,
        updater: Option<&ShapeUpdater>,
    ) -> Self {
        let dofs = registry
            .iter()
            .map(|(id, dof)| DofRecord {
                parameter: dof.parameter.clone(),
                value: dof.value,
                momentum: dof.momentum,
                mass: dof.mass,
                period: dof.period,
                integrated: integrator.is_some_and(|i| i.contains(id)),
                target: dof.target.clone(),
            })
            .collect();
        let schedules = integrator.map(|i| i.schedules()).unwrap_or_default();
        let moves = updater
            .map(|u| {
                u.statistics()
                    .into_iter()
                    .map(|(name, stats)| MoveRecord {
                        name: name.to_string(),
                        statistics: stats.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            version: CHECKPOINT_VERSION,
            timestep,
            dofs,
            schedules,
            moves,
        }
    }

    pub fn to_toml_string(&self) -> Result<String, CheckpointError> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Checkpoint = toml::from_str(content)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                found: checkpoint.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(checkpoint)
    }

    pub fn write(&self, path: &Path) -> Result<(), CheckpointError> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        info!(path = %path.display(), timestep = self.timestep, "Wrote checkpoint");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, CheckpointError> {
        let content = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Writes every recorded degree of freedom into `registry`, attaching the ones it does not
    /// hold yet. Returns the handles in record order.
    pub fn restore_dofs(
        &self,
        registry: &mut AlchemicalDofRegistry,
    ) -> Result<Vec<DofId>, EngineError> {
        let mut ids = Vec::with_capacity(self.dofs.len());
        for record in &self.dofs {
            let id = match registry.find(&record.target, &record.parameter) {
                Some(id) => {
                    let dof = registry.dof(id)?;
                    if dof.mass.to_bits() != record.mass.to_bits() || dof.period != record.period {
                        return Err(CheckpointError::Mismatch(format!(
                            "parameter '{}' of {} has mass {} and period {}, checkpoint has {} and {}",
                            record.parameter,
                            record.target,
                            dof.mass,
                            dof.period,
                            record.mass,
                            record.period
                        ))
                        .into());
                    }
                    registry.set_value(id, record.value)?;
                    registry.set_momentum(id, record.momentum)?;
                    id
                }
                None => registry.attach(DofSpec {
                    target: record.target.clone(),
                    parameter: record.parameter.clone(),
                    value: record.value,
                    momentum: record.momentum,
                    mass: record.mass,
                    period: record.period,
                })?,
            };
            ids.push(id);
        }
        Ok(ids)
    }

    /// Re-adds integrated degrees of freedom to `integrator` and restores every schedule.
    pub fn restore_schedules(
        &self,
        integrator: &mut AlchemostatIntegrator,
        registry: &AlchemicalDofRegistry,
    ) -> Result<(), EngineError> {
        for record in self.dofs.iter().filter(|r| r.integrated) {
            let id = registry
                .find(&record.target, &record.parameter)
                .ok_or_else(|| {
                    CheckpointError::Mismatch(format!(
                        "parameter '{}' of {} is not attached",
                        record.parameter, record.target
                    ))
                })?;
            if !integrator.contains(id) {
                integrator.add_dof(registry, id)?;
            }
        }
        for state in &self.schedules {
            integrator.restore_schedule(*state).map_err(|_| {
                CheckpointError::Mismatch(format!(
                    "no alchemostat group with period {}",
                    state.period
                ))
            })?;
        }
        integrator.set_current_timestep(self.timestep);
        Ok(())
    }

    pub fn restore_statistics(&self, updater: &mut ShapeUpdater) -> Result<(), EngineError> {
        for record in &self.moves {
            record.statistics.validate().map_err(|e| {
                CheckpointError::Mismatch(format!(
                    "statistics of shape move '{}' are inconsistent: {}",
                    record.name, e
                ))
            })?;
        }
        for record in &self.moves {
            updater
                .restore_statistics(&record.name, record.statistics.clone())
                .map_err(|_| {
                    CheckpointError::Mismatch(format!("no shape move named '{}'", record.name))
                })?;
        }
        Ok(())
    }

    /// Restores all persisted state into freshly configured instances.
    pub fn restore_into(
        &self,
        registry: &mut AlchemicalDofRegistry,
        integrator: Option<&mut AlchemostatIntegrator>,
        updater: Option<&mut ShapeUpdater>,
    ) -> Result<Vec<DofId>, EngineError> {
        let ids = self.restore_dofs(registry)?;
        if let Some(integrator) = integrator {
            self.restore_schedules(integrator, registry)?;
        }
        if let Some(updater) = updater {
            self.restore_statistics(updater)?;
        }
        info!(
            timestep = self.timestep,
            dofs = ids.len(),
            "Restored checkpoint"
        );
        Ok(ids)
    }
}

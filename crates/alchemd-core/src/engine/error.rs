use super::alchemostat::FiringPhase;
use super::checkpoint::CheckpointError;
use super::config::ConfigError;
use super::constraint::ConstraintError;
use crate::core::manifold::ManifoldError;
use crate::core::models::dof::DofTarget;
use crate::core::models::ids::DofId;
use crate::core::moves::ProposalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Parameter '{parameter}' of {target} already has an alchemical degree of freedom")]
    DuplicateDof { target: DofTarget, parameter: String },

    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),

    #[error("Alchemical degree of freedom {0:?} is not attached")]
    DofNotFound(DofId),

    #[error(
        "Alchemical integration diverged for {dof:?} at timestep {timestep} ({phase} phase): {quantity} is {value}"
    )]
    IntegrationDiverged {
        dof: DofId,
        timestep: u64,
        phase: FiringPhase,
        quantity: &'static str,
        value: f64,
    },

    #[error("Manifold constraint could not be satisfied: {source}")]
    ConstraintConvergence {
        #[from]
        source: ConstraintError,
    },

    #[error("Shape move produced an invalid proposal: {source}")]
    InvalidProposal {
        #[from]
        source: ProposalError,
    },

    #[error("Invalid configuration: {source}")]
    InvalidConfiguration {
        #[from]
        source: ConfigError,
    },

    #[error("Checkpoint error: {source}")]
    Checkpoint {
        #[from]
        source: CheckpointError,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl From<ManifoldError> for EngineError {
    fn from(source: ManifoldError) -> Self {
        EngineError::InvalidConfiguration {
            source: source.into(),
        }
    }
}

impl EngineError {
    /// Whether the error is absorbed as a Monte Carlo rejection when it arises inside a trial.
    pub fn is_trial_local(&self) -> bool {
        matches!(
            self,
            EngineError::ConstraintConvergence { .. } | EngineError::InvalidProposal { .. }
        )
    }
}

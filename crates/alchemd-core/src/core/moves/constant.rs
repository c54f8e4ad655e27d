use super::{ProposalError, ShapeMove, ShapeMoveProposal, finalize};
use rand::RngCore;

/// How a [`ConstantShapeMove`] transforms the current values.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantScheme {
    /// Adds the same perturbation to the current values on every trial.
    Delta(Vec<f64>),
    /// Proposes the same target shape on every trial.
    Target(Vec<f64>),
}

/// A deterministic shape move.
///
/// The same transition is attempted on every call and the random source is never consulted,
/// which makes the move suitable for measuring the acceptance probability of one specific
/// transition. Its scale is never tuned.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantShapeMove {
    scheme: ConstantScheme,
}

impl ConstantShapeMove {
    pub fn new(scheme: ConstantScheme) -> Result<Self, ProposalError> {
        let values = match &scheme {
            ConstantScheme::Delta(v) | ConstantScheme::Target(v) => v,
        };
        if values.is_empty() {
            return Err(ProposalError::Settings(
                "constant move needs at least one value".to_string(),
            ));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ProposalError::NonFinite {
                index,
                value: values[index],
            });
        }
        Ok(Self { scheme })
    }

    pub fn delta(delta: Vec<f64>) -> Result<Self, ProposalError> {
        Self::new(ConstantScheme::Delta(delta))
    }

    pub fn target(target: Vec<f64>) -> Result<Self, ProposalError> {
        Self::new(ConstantScheme::Target(target))
    }

    pub fn scheme(&self) -> &ConstantScheme {
        &self.scheme
    }
}

impl ShapeMove for ConstantShapeMove {
    fn name(&self) -> &str {
        "constant"
    }

    fn propose(
        &self,
        current: &[f64],
        scale: f64,
        _rng: &mut dyn RngCore,
    ) -> Result<ShapeMoveProposal, ProposalError> {
        let values = match &self.scheme {
            ConstantScheme::Delta(delta) => {
                if delta.len() != current.len() {
                    return Err(ProposalError::LengthMismatch {
                        expected: current.len(),
                        actual: delta.len(),
                    });
                }
                current.iter().zip(delta).map(|(v, d)| v + d).collect()
            }
            ConstantScheme::Target(target) => target.clone(),
        };
        finalize(self, current, values, scale)
    }

    fn is_adaptive(&self) -> bool {
        false
    }
}

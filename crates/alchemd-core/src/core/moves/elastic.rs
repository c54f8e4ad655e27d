use super::{
    ProposalError, ShapeMove, ShapeMoveProposal, check_move_probability, choose_subset, finalize,
};
use rand::{Rng, RngCore};

/// Scale moves on strictly positive shape parameters with an elastic energy penalty.
///
/// Each bound value is rescaled with probability `move_probability` by `exp(s·(2u − 1))`, where
/// `s` is the current move-size scale; at least one value changes on every trial. The draw is
/// symmetric in `ln v`, so sampling the values themselves uniformly requires the Jacobian
/// `Π v'/v`. Deformation away from the reference shape costs
/// `stiffness · Σ ln(v / v_ref)²`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticShapeMove {
    stiffness: f64,
    reference: Vec<f64>,
    move_probability: f64,
}

impl ElasticShapeMove {
    pub fn new(
        stiffness: f64,
        reference: Vec<f64>,
        move_probability: f64,
    ) -> Result<Self, ProposalError> {
        if !stiffness.is_finite() || stiffness < 0.0 {
            return Err(ProposalError::Settings(format!(
                "stiffness must be non-negative and finite, got {}",
                stiffness
            )));
        }
        check_move_probability(move_probability)?;
        if reference.is_empty() {
            return Err(ProposalError::Settings(
                "reference shape must have at least one value".to_string(),
            ));
        }
        if let Some(index) = reference.iter().position(|&v| !(v > 0.0 && v.is_finite())) {
            return Err(ProposalError::NonPositive {
                index,
                value: reference[index],
            });
        }
        Ok(Self {
            stiffness,
            reference,
            move_probability,
        })
    }

    pub fn stiffness(&self) -> f64 {
        self.stiffness
    }

    pub fn reference(&self) -> &[f64] {
        &self.reference
    }

    pub fn move_probability(&self) -> f64 {
        self.move_probability
    }
}

impl ShapeMove for ElasticShapeMove {
    fn name(&self) -> &str {
        "elastic"
    }

    fn propose(
        &self,
        current: &[f64],
        scale: f64,
        rng: &mut dyn RngCore,
    ) -> Result<ShapeMoveProposal, ProposalError> {
        if current.len() != self.reference.len() {
            return Err(ProposalError::LengthMismatch {
                expected: self.reference.len(),
                actual: current.len(),
            });
        }
        if let Some(index) = current.iter().position(|&v| v <= 0.0) {
            return Err(ProposalError::NonPositive {
                index,
                value: current[index],
            });
        }

        let chosen = choose_subset(current.len(), self.move_probability, rng);

        let values = current
            .iter()
            .zip(&chosen)
            .map(|(&v, &moved)| {
                if moved {
                    let u: f64 = rng.gen_range(0.0..1.0);
                    v * (scale * (2.0 * u - 1.0)).exp()
                } else {
                    v
                }
            })
            .collect();
        finalize(self, current, values, scale)
    }

    fn jacobian(&self, current: &[f64], proposed: &[f64]) -> f64 {
        current
            .iter()
            .zip(proposed)
            .map(|(old, new)| new / old)
            .product()
    }

    fn energy_penalty(&self, values: &[f64]) -> f64 {
        if values.iter().any(|&v| v <= 0.0) {
            return f64::INFINITY;
        }
        self.stiffness
            * values
                .iter()
                .zip(&self.reference)
                .map(|(v, r)| (v / r).ln().powi(2))
                .sum::<f64>()
    }
}

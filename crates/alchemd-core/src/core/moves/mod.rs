//! # Shape Moves Module
//!
//! Trial-perturbation strategies for Monte Carlo sampling of alchemical parameters.
//!
//! A [`ShapeMove`] maps the current values of the parameters bound to it (and, for stochastic
//! variants, a random source) to a [`ShapeMoveProposal`]. Generators never touch simulation
//! state; the [`crate::engine::updater::ShapeUpdater`] decides whether a proposal is applied.
//!
//! ## Variants
//!
//! - [`constant::ConstantShapeMove`] - The same deterministic transition on every trial
//! - [`external::ExternalShapeMove`] - Delegates the draw-to-shape mapping to an injected closure
//! - [`elastic::ElasticShapeMove`] - Log-uniform scale moves with a stiffness penalty against a
//!   reference shape
//! - [`vertex::VertexShapeMove`] - Random walks on positive values renormalized to a fixed product
//!
//! Every variant may report a Jacobian (volume) factor for moves that are not symmetric in the
//! sampled measure, and an internal energy penalty that the acceptance test must include.

pub mod constant;
pub mod elastic;
pub mod external;
pub mod vertex;

use rand::{Rng, RngCore};
use thiserror::Error;

/// A trial set of values for the parameters bound to one shape move.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeMoveProposal {
    /// Proposed values, index-aligned with the parameters bound to the move.
    pub values: Vec<f64>,
    /// Ratio of reverse to forward proposal densities in the sampled measure.
    pub jacobian: f64,
    /// Move-size scale that was used to draw this proposal.
    pub scale: f64,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProposalError {
    #[error("Proposal has {actual} values but the move is bound to {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Proposed value {value} at index {index} is not finite")]
    NonFinite { index: usize, value: f64 },

    #[error("Proposed value {value} at index {index} lies outside the domain [{min}, {max}]")]
    OutOfDomain {
        index: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Current value {value} at index {index} must be positive for scale moves")]
    NonPositive { index: usize, value: f64 },

    #[error("Jacobian factor {0} must be positive and finite")]
    InvalidJacobian(f64),

    #[error("Invalid move settings: {0}")]
    Settings(String),
}

/// A closed interval that proposed values must stay within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub min: f64,
    pub max: f64,
}

impl Domain {
    pub fn new(min: f64, max: f64) -> Result<Self, ProposalError> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(ProposalError::Settings(format!(
                "domain bounds [{}, {}] are not an interval",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn unbounded() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    /// The unit interval, the natural domain of normalized shape parameters.
    pub fn unit() -> Self {
        Self { min: 0.0, max: 1.0 }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn check(&self, values: &[f64]) -> Result<(), ProposalError> {
        match values.iter().position(|&v| !self.contains(v)) {
            Some(index) => Err(ProposalError::OutOfDomain {
                index,
                value: values[index],
                min: self.min,
                max: self.max,
            }),
            None => Ok(()),
        }
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// A pluggable trial-perturbation strategy.
///
/// Implementations must be object safe; the updater only ever holds a `Box<dyn ShapeMove>`.
pub trait ShapeMove: Send + Sync {
    /// Human-readable identifier used in logs.
    fn name(&self) -> &str;

    /// Draws a trial shape from the current values.
    fn propose(
        &self,
        current: &[f64],
        scale: f64,
        rng: &mut dyn RngCore,
    ) -> Result<ShapeMoveProposal, ProposalError>;

    /// Jacobian (volume) factor of the transition `current -> proposed`. Symmetric moves keep
    /// the default of one.
    fn jacobian(&self, _current: &[f64], _proposed: &[f64]) -> f64 {
        1.0
    }

    /// Internal energy the move itself attaches to a shape, added to the configurational energy
    /// difference in the acceptance test.
    fn energy_penalty(&self, _values: &[f64]) -> f64 {
        0.0
    }

    /// Whether the updater may tune this move's scale toward a target acceptance ratio.
    fn is_adaptive(&self) -> bool {
        true
    }
}

pub(crate) fn check_move_probability(move_probability: f64) -> Result<(), ProposalError> {
    if move_probability > 0.0 && move_probability <= 1.0 {
        Ok(())
    } else {
        Err(ProposalError::Settings(format!(
            "move probability must lie in (0, 1], got {}",
            move_probability
        )))
    }
}

/// Picks each of `n` values independently with `move_probability`, forcing one uniformly chosen
/// value when the draw leaves the subset empty. `n` must be non-zero.
pub(crate) fn choose_subset(n: usize, move_probability: f64, rng: &mut dyn RngCore) -> Vec<bool> {
    let mut chosen: Vec<bool> = (0..n).map(|_| rng.gen_bool(move_probability)).collect();
    if !chosen.iter().any(|&c| c) {
        let forced = rng.gen_range(0..n);
        chosen[forced] = true;
    }
    chosen
}

/// Validates proposed values against the current ones and attaches the move's Jacobian.
pub(crate) fn finalize<M>(
    shape_move: &M,
    current: &[f64],
    values: Vec<f64>,
    scale: f64,
) -> Result<ShapeMoveProposal, ProposalError>
where
    M: ShapeMove + ?Sized,
{
    if values.len() != current.len() {
        return Err(ProposalError::LengthMismatch {
            expected: current.len(),
            actual: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(ProposalError::NonFinite {
            index,
            value: values[index],
        });
    }
    let jacobian = shape_move.jacobian(current, &values);
    if !jacobian.is_finite() || jacobian <= 0.0 {
        return Err(ProposalError::InvalidJacobian(jacobian));
    }
    Ok(ShapeMoveProposal {
        values,
        jacobian,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl ShapeMove for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn propose(
            &self,
            current: &[f64],
            scale: f64,
            _rng: &mut dyn RngCore,
        ) -> Result<ShapeMoveProposal, ProposalError> {
            finalize(self, current, current.to_vec(), scale)
        }
    }

    #[test]
    fn trait_defaults_describe_a_symmetric_adaptive_move() {
        let m = Identity;
        assert_eq!(m.jacobian(&[1.0], &[2.0]), 1.0);
        assert_eq!(m.energy_penalty(&[1.0]), 0.0);
        assert!(m.is_adaptive());
    }

    #[test]
    fn finalize_rejects_length_mismatch() {
        let err = finalize(&Identity, &[1.0, 2.0], vec![1.0], 0.1).unwrap_err();
        assert_eq!(
            err,
            ProposalError::LengthMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn finalize_rejects_non_finite_values() {
        let err = finalize(&Identity, &[1.0, 2.0], vec![1.0, f64::INFINITY], 0.1).unwrap_err();
        assert!(matches!(err, ProposalError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn finalize_attaches_jacobian_and_scale() {
        let proposal = finalize(&Identity, &[0.5], vec![0.75], 0.2).unwrap();
        assert_eq!(proposal.values, vec![0.75]);
        assert_eq!(proposal.jacobian, 1.0);
        assert_eq!(proposal.scale, 0.2);
    }

    #[test]
    fn domain_check_reports_first_violation() {
        let domain = Domain::unit();
        assert!(domain.check(&[0.0, 0.5, 1.0]).is_ok());
        assert_eq!(
            domain.check(&[0.5, 1.5, -1.0]),
            Err(ProposalError::OutOfDomain {
                index: 1,
                value: 1.5,
                min: 0.0,
                max: 1.0
            })
        );
    }

    #[test]
    fn domain_new_rejects_inverted_bounds() {
        assert!(Domain::new(1.0, 0.0).is_err());
        assert!(Domain::new(0.0, f64::NAN).is_err());
        assert!(Domain::new(-1.0, 1.0).is_ok());
    }

    #[test]
    fn subset_is_never_empty_and_full_probability_picks_everything() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(4);
        for _ in 0..100 {
            let chosen = choose_subset(5, 1e-12, &mut rng);
            assert_eq!(chosen.iter().filter(|&&c| c).count(), 1);
        }
        assert!(choose_subset(3, 1.0, &mut rng).into_iter().all(|c| c));
    }

    #[test]
    fn move_probability_must_lie_in_the_half_open_unit_interval() {
        assert!(check_move_probability(1.0).is_ok());
        assert!(check_move_probability(0.25).is_ok());
        for p in [0.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                check_move_probability(p),
                Err(ProposalError::Settings(_))
            ));
        }
    }
}

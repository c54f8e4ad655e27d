use super::{
    ProposalError, ShapeMove, ShapeMoveProposal, check_move_probability, choose_subset, finalize,
};
use rand::{Rng, RngCore};

/// Random walks on strictly positive values that keep their product fixed.
///
/// Each bound value is shifted with probability `move_probability` by
/// `s·V^(1/n)·(2u − 1)`, where `s` is the move-size scale, `V` the conserved volume and `n` the
/// number of bound values; at least one value changes on every trial. The shifted values are then
/// rescaled uniformly by `(V / Π v')^(1/n)`, so every proposal has `Π v = V`.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexShapeMove {
    volume: f64,
    move_probability: f64,
}

impl VertexShapeMove {
    pub fn new(volume: f64, move_probability: f64) -> Result<Self, ProposalError> {
        if !(volume > 0.0 && volume.is_finite()) {
            return Err(ProposalError::Settings(format!(
                "volume must be positive and finite, got {}",
                volume
            )));
        }
        check_move_probability(move_probability)?;
        Ok(Self {
            volume,
            move_probability,
        })
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn move_probability(&self) -> f64 {
        self.move_probability
    }
}

impl ShapeMove for VertexShapeMove {
    fn name(&self) -> &str {
        "vertex"
    }

    fn propose(
        &self,
        current: &[f64],
        scale: f64,
        rng: &mut dyn RngCore,
    ) -> Result<ShapeMoveProposal, ProposalError> {
        if current.is_empty() {
            return Err(ProposalError::LengthMismatch {
                expected: 1,
                actual: 0,
            });
        }
        if let Some(index) = current.iter().position(|&v| v <= 0.0) {
            return Err(ProposalError::NonPositive {
                index,
                value: current[index],
            });
        }

        let n = current.len() as f64;
        let step = scale * self.volume.powf(1.0 / n);
        let chosen = choose_subset(current.len(), self.move_probability, rng);
        let shifted: Vec<f64> = current
            .iter()
            .zip(&chosen)
            .map(|(&v, &moved)| {
                if moved {
                    v + step * (2.0 * rng.gen_range(0.0..1.0) - 1.0)
                } else {
                    v
                }
            })
            .collect();
        if let Some(index) = shifted.iter().position(|&v| !(v > 0.0)) {
            return Err(ProposalError::NonPositive {
                index,
                value: shifted[index],
            });
        }

        // Uniform rescale, computed in log space.
        let log_product: f64 = shifted.iter().map(|v| v.ln()).sum();
        let factor = ((self.volume.ln() - log_product) / n).exp();
        let values = shifted.into_iter().map(|v| v * factor).collect();
        finalize(self, current, values, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn product(values: &[f64]) -> f64 {
        values.iter().product()
    }

    #[test]
    fn proposals_preserve_the_volume() {
        let m = VertexShapeMove::new(6.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(21);
        let mut current = vec![1.0, 2.0, 3.0];
        for _ in 0..200 {
            match m.propose(&current, 0.2, &mut rng) {
                Ok(p) => {
                    assert!((product(&p.values) / 6.0 - 1.0).abs() < 1e-12);
                    assert!(p.values.iter().all(|&v| v > 0.0));
                    assert_eq!(p.jacobian, 1.0);
                    current = p.values;
                }
                Err(ProposalError::NonPositive { .. }) => {}
                Err(other) => panic!("unexpected error {other}"),
            }
        }
    }

    #[test]
    fn current_values_off_the_volume_are_projected_onto_it() {
        let m = VertexShapeMove::new(1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let p = m.propose(&[2.0, 2.0], 1e-6, &mut rng).unwrap();
        assert!((product(&p.values) - 1.0).abs() < 1e-12);
        assert!((p.values[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn low_probability_still_shifts_one_value() {
        let m = VertexShapeMove::new(1.0, 1e-9).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let current = [1.0; 4];
        for _ in 0..50 {
            let p = m.propose(&current, 0.1, &mut rng).unwrap();
            // One shifted value; the rescaling then moves the others together.
            let mut distinct = p.values.clone();
            distinct.sort_by(f64::total_cmp);
            distinct.dedup_by(|a, b| (*a - *b).abs() < 1e-15);
            assert!(distinct.len() <= 2);
            assert!((product(&p.values) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn same_seed_reproduces_the_same_proposal() {
        let m = VertexShapeMove::new(8.0, 0.5).unwrap();
        let a = m
            .propose(&[2.0, 2.0, 2.0], 0.1, &mut StdRng::seed_from_u64(5))
            .unwrap();
        let b = m
            .propose(&[2.0, 2.0, 2.0], 0.1, &mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_positive_values_are_rejected() {
        let m = VertexShapeMove::new(1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            m.propose(&[1.0, 0.0], 0.1, &mut rng),
            Err(ProposalError::NonPositive { index: 1, .. })
        ));
        assert!(matches!(
            m.propose(&[], 0.1, &mut rng),
            Err(ProposalError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn construction_validates_settings() {
        assert!(VertexShapeMove::new(0.0, 0.5).is_err());
        assert!(VertexShapeMove::new(-2.0, 0.5).is_err());
        assert!(VertexShapeMove::new(f64::INFINITY, 0.5).is_err());
        assert!(VertexShapeMove::new(1.0, 0.0).is_err());
        assert!(VertexShapeMove::new(1.0, 1.5).is_err());
        let m = VertexShapeMove::new(2.0, 0.25).unwrap();
        assert_eq!((m.volume(), m.move_probability()), (2.0, 0.25));
    }
}

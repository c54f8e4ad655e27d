use super::{
    Domain, ProposalError, ShapeMove, ShapeMoveProposal, check_move_probability, choose_subset,
    finalize,
};
use rand::{Rng, RngCore};
use std::fmt;

/// Maps `(current values, uniform draws in [0, 1), scale)` to proposed values.
pub type PerturbationFn = dyn Fn(&[f64], &[f64], f64) -> Vec<f64> + Send + Sync;

/// A shape move whose perturbation is supplied by the caller.
///
/// The generator draws one uniform variate per bound value and hands them, together with the
/// current values and the move-size scale, to the injected function. With a `move_probability`
/// below one only a random non-empty subset of the values is handed over; the rest are carried
/// into the proposal unchanged. The move performs no physics of its own. It only checks that the
/// returned proposal has the right length, is finite and lies within the declared domain.
pub struct ExternalShapeMove {
    name: String,
    perturb: Box<PerturbationFn>,
    domain: Domain,
    move_probability: f64,
}

impl ExternalShapeMove {
    pub fn new<F>(name: impl Into<String>, domain: Domain, perturb: F) -> Self
    where
        F: Fn(&[f64], &[f64], f64) -> Vec<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            perturb: Box::new(perturb),
            domain,
            move_probability: 1.0,
        }
    }

    /// Restricts each trial to values picked independently with probability `move_probability`.
    pub fn with_move_probability(mut self, move_probability: f64) -> Result<Self, ProposalError> {
        check_move_probability(move_probability)?;
        self.move_probability = move_probability;
        Ok(self)
    }

    /// A symmetric random walk, `v' = v + scale·(2u − 1)`, confined to `domain`.
    pub fn random_walk(domain: Domain) -> Self {
        Self::new("random-walk", domain, |current, draws, scale| {
            current
                .iter()
                .zip(draws)
                .map(|(v, u)| v + scale * (2.0 * u - 1.0))
                .collect()
        })
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn move_probability(&self) -> f64 {
        self.move_probability
    }
}

impl fmt::Debug for ExternalShapeMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalShapeMove")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("move_probability", &self.move_probability)
            .finish_non_exhaustive()
    }
}

impl ShapeMove for ExternalShapeMove {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(
        &self,
        current: &[f64],
        scale: f64,
        rng: &mut dyn RngCore,
    ) -> Result<ShapeMoveProposal, ProposalError> {
        if self.move_probability >= 1.0 || current.is_empty() {
            let draws: Vec<f64> = (0..current.len())
                .map(|_| rng.gen_range(0.0..1.0))
                .collect();
            let values = (self.perturb)(current, &draws, scale);
            let proposal = finalize(self, current, values, scale)?;
            self.domain.check(&proposal.values)?;
            return Ok(proposal);
        }

        let chosen = choose_subset(current.len(), self.move_probability, rng);
        let indices: Vec<usize> = (0..current.len()).filter(|&i| chosen[i]).collect();
        let subset: Vec<f64> = indices.iter().map(|&i| current[i]).collect();
        let draws: Vec<f64> = (0..subset.len())
            .map(|_| rng.gen_range(0.0..1.0))
            .collect();
        let moved = (self.perturb)(&subset, &draws, scale);
        if moved.len() != subset.len() {
            return Err(ProposalError::LengthMismatch {
                expected: subset.len(),
                actual: moved.len(),
            });
        }
        let mut values = current.to_vec();
        for (&i, v) in indices.iter().zip(moved) {
            values[i] = v;
        }
        let proposal = finalize(self, current, values, scale)?;
        self.domain.check(&proposal.values)?;
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn callback_receives_one_draw_per_value() {
        let m = ExternalShapeMove::new("echo", Domain::unit(), |_, draws, _| draws.to_vec());
        let mut rng = StdRng::seed_from_u64(42);
        let proposal = m.propose(&[0.5, 0.5, 0.5], 0.1, &mut rng).unwrap();
        assert_eq!(proposal.values.len(), 3);
        assert!(proposal.values.iter().all(|u| (0.0..1.0).contains(u)));
        assert_eq!(proposal.jacobian, 1.0);
    }

    #[test]
    fn same_seed_reproduces_the_same_proposal() {
        let m = ExternalShapeMove::random_walk(Domain::unbounded());
        let a = m
            .propose(&[1.0, 2.0], 0.3, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = m
            .propose(&[1.0, 2.0], 0.3, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn random_walk_stays_within_scale() {
        let m = ExternalShapeMove::random_walk(Domain::unbounded());
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let p = m.propose(&[0.0], 0.25, &mut rng).unwrap();
            assert!(p.values[0].abs() <= 0.25);
        }
    }

    #[test]
    fn out_of_domain_proposal_is_rejected() {
        let m = ExternalShapeMove::new("escape", Domain::unit(), |current, _, _| {
            current.iter().map(|v| v + 10.0).collect()
        });
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            m.propose(&[0.5], 0.1, &mut rng),
            Err(ProposalError::OutOfDomain { index: 0, .. })
        ));
    }

    #[test]
    fn non_finite_and_misshapen_proposals_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let nan = ExternalShapeMove::new("nan", Domain::unbounded(), |c, _, _| {
            vec![f64::NAN; c.len()]
        });
        assert!(matches!(
            nan.propose(&[0.5], 0.1, &mut rng),
            Err(ProposalError::NonFinite { .. })
        ));

        let short = ExternalShapeMove::new("short", Domain::unbounded(), |_, _, _| vec![]);
        assert!(matches!(
            short.propose(&[0.5, 0.5], 0.1, &mut rng),
            Err(ProposalError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn partial_moves_hand_only_the_chosen_values_to_the_callback() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        let m = ExternalShapeMove::new("shift", Domain::unbounded(), move |current, draws, _| {
            assert_eq!(current.len(), draws.len());
            log.lock().unwrap().push(current.len());
            current.iter().map(|v| v + 100.0).collect()
        })
        .with_move_probability(1e-9)
        .unwrap();
        let mut rng = StdRng::seed_from_u64(8);
        let current = [1.0, 2.0, 3.0, 4.0];
        for _ in 0..50 {
            let p = m.propose(&current, 0.1, &mut rng).unwrap();
            let moved: Vec<usize> = (0..4).filter(|&i| p.values[i] != current[i]).collect();
            assert_eq!(moved.len(), 1);
            assert_eq!(p.values[moved[0]], current[moved[0]] + 100.0);
        }
        assert!(seen.lock().unwrap().iter().all(|&n| n == 1));
    }

    #[test]
    fn partial_moves_check_the_callback_length_against_the_subset() {
        let m = ExternalShapeMove::new("echo", Domain::unbounded(), |_, _, _| vec![0.0; 4])
            .with_move_probability(0.5)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut mismatches = 0;
        for _ in 0..20 {
            match m.propose(&[1.0, 2.0, 3.0, 4.0], 0.1, &mut rng) {
                Err(ProposalError::LengthMismatch { expected, actual: 4 }) => {
                    assert!(expected < 4);
                    mismatches += 1;
                }
                Ok(p) => assert_eq!(p.values, vec![0.0; 4]),
                Err(other) => panic!("unexpected error {other}"),
            }
        }
        assert!(mismatches > 0);
    }

    #[test]
    fn move_probability_is_validated() {
        for p in [0.0, -1.0, 1.01, f64::NAN] {
            assert!(
                ExternalShapeMove::random_walk(Domain::unit())
                    .with_move_probability(p)
                    .is_err()
            );
        }
        let m = ExternalShapeMove::random_walk(Domain::unit())
            .with_move_probability(0.3)
            .unwrap();
        assert_eq!(m.move_probability(), 0.3);
    }

    #[test]
    fn debug_output_names_the_move() {
        let m = ExternalShapeMove::random_walk(Domain::unit());
        assert!(format!("{:?}", m).contains("random-walk"));
    }
}

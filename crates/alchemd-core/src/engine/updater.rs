use super::comm::Communicator;
use super::config::{ConfigError, ShapeUpdaterConfig};
use super::constraint::ManifoldConstraint;
use super::context::{ParticleUpdate, SimulationContext, TrialOverrides};
use super::error::EngineError;
use super::registry::AlchemicalDofRegistry;
use super::statistics::{MoveCounts, MoveStatistics};
use super::transaction::TrialTransaction;
use super::utils::sampling::metropolis_criterion;
use crate::core::models::ids::DofId;
use crate::core::moves::{ProposalError, ShapeMove, ShapeMoveProposal};
use rand::{Rng, RngCore};
use std::fmt;
use tracing::{debug, instrument, trace};

/// Why a trial was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The Metropolis test failed.
    Metropolis,
    /// The trial energy or the energy change was not finite.
    NonFiniteEnergy,
    /// The move produced an unusable proposal.
    InvalidProposal,
    /// A particle could not be projected back onto the manifold.
    ConstraintFailure,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectionReason::Metropolis => "metropolis",
            RejectionReason::NonFiniteEnergy => "non-finite energy",
            RejectionReason::InvalidProposal => "invalid proposal",
            RejectionReason::ConstraintFailure => "constraint failure",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Accepted,
    Rejected(RejectionReason),
}

impl TrialOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, TrialOutcome::Accepted)
    }
}

/// A shape move together with the degrees of freedom it perturbs.
pub struct MoveBinding {
    name: String,
    dofs: Vec<DofId>,
    generator: Box<dyn ShapeMove>,
    stats: MoveStatistics,
}

impl MoveBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dofs(&self) -> &[DofId] {
        &self.dofs
    }

    pub fn generator(&self) -> &dyn ShapeMove {
        self.generator.as_ref()
    }

    pub fn statistics(&self) -> &MoveStatistics {
        &self.stats
    }
}

impl fmt::Debug for MoveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoveBinding")
            .field("name", &self.name)
            .field("generator", &self.generator.name())
            .field("dofs", &self.dofs)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Metropolis Monte Carlo on alchemical values.
///
/// Each call to [`ShapeUpdater::update`] performs one trial with one uniformly chosen move. All
/// random choices are made on the root worker and broadcast, so every worker applies the same
/// decision to its replica of the registry.
#[derive(Debug)]
pub struct ShapeUpdater {
    config: ShapeUpdaterConfig,
    bindings: Vec<MoveBinding>,
    constraint: Option<ManifoldConstraint>,
}

impl ShapeUpdater {
    pub fn new(config: ShapeUpdaterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            bindings: Vec::new(),
            constraint: None,
        })
    }

    /// Projects particles displaced by a trial onto `constraint` before the trial is evaluated.
    pub fn with_constraint(mut self, constraint: ManifoldConstraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn config(&self) -> &ShapeUpdaterConfig {
        &self.config
    }

    pub fn constraint(&self) -> Option<&ManifoldConstraint> {
        self.constraint.as_ref()
    }

    pub fn temperature(&self) -> f64 {
        self.config.temperature
    }

    pub fn set_temperature(&mut self, kt: f64) -> Result<(), EngineError> {
        if !(kt.is_finite() && kt > 0.0) {
            return Err(ConfigError::invalid(
                "temperature",
                format!("must be positive and finite, got {}", kt),
            )
            .into());
        }
        self.config.temperature = kt;
        Ok(())
    }

    /// Binds `generator` to `dofs`. Without an explicit `initial_scale` the move starts at the
    /// configured `move_size_scale`.
    pub fn add_move(
        &mut self,
        registry: &AlchemicalDofRegistry,
        name: impl Into<String>,
        dofs: Vec<DofId>,
        generator: Box<dyn ShapeMove>,
        initial_scale: Option<f64>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if self.bindings.iter().any(|b| b.name == name) {
            return Err(
                ConfigError::invalid("name", format!("a move named '{}' already exists", name))
                    .into(),
            );
        }
        if dofs.is_empty() {
            return Err(
                ConfigError::invalid("dofs", "a move must perturb at least one value").into(),
            );
        }
        for &id in &dofs {
            registry.dof(id)?;
        }
        let scale = initial_scale.unwrap_or(self.config.move_size_scale);
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ConfigError::invalid(
                "move_size_scale",
                format!("must be positive and finite, got {}", scale),
            )
            .into());
        }

        debug!(move_name = %name, generator = generator.name(), scale, "Registered shape move");
        self.bindings.push(MoveBinding {
            name,
            dofs,
            generator,
            stats: MoveStatistics::new(scale),
        });
        Ok(())
    }

    pub fn moves(&self) -> &[MoveBinding] {
        &self.bindings
    }

    /// Statistics per move, in registration order.
    pub fn statistics(&self) -> Vec<(&str, &MoveStatistics)> {
        self.bindings
            .iter()
            .map(|b| (b.name.as_str(), &b.stats))
            .collect()
    }

    pub fn statistics_for(&self, name: &str) -> Option<&MoveStatistics> {
        self.bindings
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.stats)
    }

    pub fn total_statistics(&self) -> MoveCounts {
        let mut total = MoveCounts::default();
        for binding in &self.bindings {
            total += binding.stats.counts();
        }
        total
    }

    pub fn restore_statistics(
        &mut self,
        name: &str,
        stats: MoveStatistics,
    ) -> Result<(), EngineError> {
        let binding = self
            .bindings
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| EngineError::InvalidState(format!("no shape move named '{}'", name)))?;
        stats.validate()?;
        binding.stats = stats;
        Ok(())
    }

    /// The current values of each move's degrees of freedom, in registration order.
    pub fn type_params(
        &self,
        registry: &AlchemicalDofRegistry,
    ) -> Result<Vec<(String, Vec<f64>)>, EngineError> {
        self.bindings
            .iter()
            .map(|b| Ok((b.name.clone(), current_values(registry, &b.dofs)?)))
            .collect()
    }

    /// Performs one trial; returns whether it was accepted.
    pub fn update<C>(
        &mut self,
        context: &mut C,
        registry: &mut AlchemicalDofRegistry,
        comm: &dyn Communicator,
        rng: &mut dyn RngCore,
    ) -> Result<bool, EngineError>
    where
        C: SimulationContext + ?Sized,
    {
        self.trial(context, registry, comm, rng)
            .map(|outcome| outcome.is_accepted())
    }

    /// Performs one trial and reports how it ended.
    #[instrument(level = "trace", skip_all)]
    pub fn trial<C>(
        &mut self,
        context: &mut C,
        registry: &mut AlchemicalDofRegistry,
        comm: &dyn Communicator,
        rng: &mut dyn RngCore,
    ) -> Result<TrialOutcome, EngineError>
    where
        C: SimulationContext + ?Sized,
    {
        if self.bindings.is_empty() {
            return Err(EngineError::InvalidState(
                "shape updater has no moves to attempt".to_string(),
            ));
        }

        // 1. Root selects a move and draws the proposal; both are broadcast.
        let local_choice = if comm.is_root() {
            rng.gen_range(0..self.bindings.len())
        } else {
            0
        };
        let index = comm.broadcast_index(local_choice);
        let binding = self.bindings.get(index).ok_or_else(|| {
            EngineError::Internal(format!("broadcast move index {} out of range", index))
        })?;

        let current = current_values(registry, &binding.dofs)?;
        let local_proposal = if comm.is_root() {
            binding
                .generator
                .propose(&current, binding.stats.move_size, rng)
                .and_then(|p| check_proposal(p, current.len()))
        } else {
            Err(ProposalError::Settings("proposals are drawn on the root".to_string()))
        };
        if !comm.broadcast_flag(local_proposal.is_ok()) {
            if let Err(err) = &local_proposal {
                debug!(move_name = %binding.name, error = %err, "Discarding invalid proposal");
            }
            return Ok(self.finish(index, TrialOutcome::Rejected(RejectionReason::InvalidProposal)));
        }
        let mut payload = match local_proposal {
            Ok(p) => std::iter::once(p.jacobian).chain(p.values).collect(),
            Err(_) => Vec::new(),
        };
        comm.broadcast_f64s(&mut payload);
        let (jacobian, proposed) = match payload.split_first() {
            Some((&jacobian, values)) if values.len() == current.len() => {
                (jacobian, values.to_vec())
            }
            _ => {
                return Err(EngineError::Internal(
                    "malformed proposal broadcast".to_string(),
                ));
            }
        };

        // 2. Reference energy with the current values.
        let e0 = comm.all_reduce_sum(context.local_energy(registry, None));

        // 3. Apply the trial values and project any particles they displace.
        let mut tx = TrialTransaction::begin(registry)?;
        tx.set_values(&binding.dofs, &proposed)?;
        let projected = self.project_displacements(context.trial_displacements(tx.registry()));
        if comm.any(projected.is_none()) {
            tx.revert();
            return Ok(self.finish(
                index,
                TrialOutcome::Rejected(RejectionReason::ConstraintFailure),
            ));
        }
        let updates = projected.unwrap_or_default();
        let overrides = TrialOverrides::new(updates);

        // 4. Trial energy and the full acceptance exponent.
        let e1 = comm.all_reduce_sum(context.local_energy(tx.registry(), Some(&overrides)));
        let penalty = binding.generator.energy_penalty(&proposed)
            - binding.generator.energy_penalty(&current);
        let kt = self.config.temperature;
        let delta = e1 - e0 + penalty - kt * jacobian.ln();
        trace!(move_name = %binding.name, e0, e1, penalty, jacobian, delta, "Evaluated trial");

        if !(e1.is_finite() && delta.is_finite()) {
            tx.revert();
            return Ok(self.finish(
                index,
                TrialOutcome::Rejected(RejectionReason::NonFiniteEnergy),
            ));
        }

        // 5. Root decides; the decision is broadcast.
        let local_accept = comm.is_root() && metropolis_criterion(delta, kt, rng);
        let accepted = comm.broadcast_flag(local_accept);

        // 6. Commit or revert.
        let outcome = if accepted {
            tx.commit();
            context.commit_trial(registry, &overrides);
            TrialOutcome::Accepted
        } else {
            tx.revert();
            TrialOutcome::Rejected(RejectionReason::Metropolis)
        };
        Ok(self.finish(index, outcome))
    }

    fn project_displacements(
        &self,
        displacements: Vec<ParticleUpdate>,
    ) -> Option<Vec<ParticleUpdate>> {
        let Some(constraint) = &self.constraint else {
            return Some(displacements);
        };
        let mut projected = Vec::with_capacity(displacements.len());
        for update in displacements {
            match constraint.project(&update.position, &update.velocity) {
                Ok((position, velocity)) => projected.push(ParticleUpdate {
                    index: update.index,
                    position,
                    velocity,
                }),
                Err(err) => {
                    trace!(particle = update.index, error = %err, "Trial projection failed");
                    return None;
                }
            }
        }
        Some(projected)
    }

    /// Records the outcome and retunes the move once a full window has been observed.
    fn finish(&mut self, index: usize, outcome: TrialOutcome) -> TrialOutcome {
        let tuning = self.config.tuning;
        let binding = &mut self.bindings[index];
        binding.stats.record(outcome.is_accepted());
        if let Some(tuning) = tuning {
            if binding.generator.is_adaptive() {
                if let Some(scale) = binding.stats.tune(&tuning) {
                    debug!(move_name = %binding.name, scale, "Retuned move size");
                }
            }
        }
        trace!(move_name = %binding.name, ?outcome, "Trial finished");
        outcome
    }
}

fn current_values(
    registry: &AlchemicalDofRegistry,
    dofs: &[DofId],
) -> Result<Vec<f64>, EngineError> {
    dofs.iter()
        .map(|&id| registry.get(id).map(|s| s.value))
        .collect()
}

fn check_proposal(
    proposal: ShapeMoveProposal,
    expected: usize,
) -> Result<ShapeMoveProposal, ProposalError> {
    if proposal.values.len() != expected {
        return Err(ProposalError::LengthMismatch {
            expected,
            actual: proposal.values.len(),
        });
    }
    if let Some(index) = proposal.values.iter().position(|v| !v.is_finite()) {
        return Err(ProposalError::NonFinite {
            index,
            value: proposal.values[index],
        });
    }
    if !(proposal.jacobian.is_finite() && proposal.jacobian > 0.0) {
        return Err(ProposalError::InvalidJacobian(proposal.jacobian));
    }
    Ok(proposal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifold::gyroid::Gyroid;
    use crate::core::models::dof::{DofSpec, DofTarget};
    use crate::core::moves::constant::ConstantShapeMove;
    use crate::core::moves::external::ExternalShapeMove;
    use crate::core::moves::{Domain, finalize};
    use crate::engine::comm::{LocalGroup, SerialCommunicator};
    use crate::engine::config::{ProjectionConfig, TuningConfig};
    use crate::engine::registry::RegistryPhase;
    use crate::engine::test_utils::HarmonicContext;
    use nalgebra::{Point3, Vector3};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f64::consts::TAU;
    use std::sync::Arc;
    use std::thread;

    fn updater(kt: f64, tuning: Option<TuningConfig>) -> ShapeUpdater {
        ShapeUpdater::new(ShapeUpdaterConfig {
            temperature: kt,
            move_size_scale: 0.1,
            tuning,
        })
        .unwrap()
    }

    fn single_dof(value: f64) -> (AlchemicalDofRegistry, DofId) {
        let mut registry = AlchemicalDofRegistry::new();
        let id = registry
            .attach(DofSpec::new(DofTarget::Type("A".to_string()), "diameter", value))
            .unwrap();
        (registry, id)
    }

    /// Proposes a fixed target with a fixed Jacobian and a linear internal penalty.
    struct Weighted {
        target: f64,
        jacobian: f64,
        stiffness: f64,
    }

    impl ShapeMove for Weighted {
        fn name(&self) -> &str {
            "weighted"
        }

        fn propose(
            &self,
            current: &[f64],
            scale: f64,
            _rng: &mut dyn RngCore,
        ) -> Result<ShapeMoveProposal, ProposalError> {
            finalize(self, current, vec![self.target; current.len()], scale)
        }

        fn jacobian(&self, _current: &[f64], _proposed: &[f64]) -> f64 {
            self.jacobian
        }

        fn energy_penalty(&self, values: &[f64]) -> f64 {
            self.stiffness * values.iter().sum::<f64>()
        }

        fn is_adaptive(&self) -> bool {
            false
        }
    }

    #[test]
    fn acceptance_rate_of_a_fixed_transition_matches_boltzmann_factor() {
        let (mut registry, id) = single_dof(0.0);
        let mut context = HarmonicContext::new().with_well(id, 1.0, 0.0);
        let mut updater = updater(1.0, None);
        updater
            .add_move(
                &registry,
                "grow",
                vec![id],
                Box::new(ConstantShapeMove::target(vec![1.0]).unwrap()),
                None,
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(17);
        let trials = 20_000;
        let mut accepted = 0;
        for _ in 0..trials {
            registry.set_value(id, 0.0).unwrap();
            if updater
                .update(&mut context, &mut registry, &SerialCommunicator, &mut rng)
                .unwrap()
            {
                accepted += 1;
            }
        }
        let ratio = accepted as f64 / trials as f64;
        assert!((ratio - (-0.5f64).exp()).abs() < 0.02, "ratio {}", ratio);
        assert_eq!(updater.statistics_for("grow").unwrap().attempted, trials);
    }

    #[test]
    fn symmetric_random_walk_samples_the_boltzmann_distribution() {
        let (mut registry, id) = single_dof(0.0);
        let mut context = HarmonicContext::new().with_well(id, 1.0, 0.0);
        let mut updater = updater(1.0, None);
        updater
            .add_move(
                &registry,
                "walk",
                vec![id],
                Box::new(ExternalShapeMove::random_walk(Domain::unbounded())),
                Some(1.0),
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..1_000 {
            updater
                .update(&mut context, &mut registry, &SerialCommunicator, &mut rng)
                .unwrap();
        }
        let samples = 50_000;
        let (mut sum, mut sum_sq) = (0.0, 0.0);
        for _ in 0..samples {
            updater
                .update(&mut context, &mut registry, &SerialCommunicator, &mut rng)
                .unwrap();
            let value = registry.get(id).unwrap().value;
            sum += value;
            sum_sq += value * value;
        }
        let mean = sum / samples as f64;
        let variance = sum_sq / samples as f64 - mean * mean;
        assert!(mean.abs() < 0.1, "mean {}", mean);
        assert!((variance - 1.0).abs() < 0.15, "variance {}", variance);
    }

    #[test]
    fn jacobian_and_penalty_enter_the_acceptance_exponent() {
        let (mut registry, id) = single_dof(0.0);
        let mut context = HarmonicContext::new();
        let kt = 2.0;
        let mut updater = updater(kt, None);
        // Penalty change kT·ln J exactly cancels the Jacobian term.
        let jacobian = 3.0f64;
        updater
            .add_move(
                &registry,
                "balanced",
                vec![id],
                Box::new(Weighted {
                    target: 1.0,
                    jacobian,
                    stiffness: kt * jacobian.ln(),
                }),
                None,
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            registry.set_value(id, 0.0).unwrap();
            assert!(
                updater
                    .update(&mut context, &mut registry, &SerialCommunicator, &mut rng)
                    .unwrap()
            );
        }
    }

    #[test]
    fn rejected_trials_restore_values_bit_identically() {
        let start = 0.1 + 0.2;
        let (mut registry, id) = single_dof(start);
        let mut context = HarmonicContext::new().with_well(id, 1e6, start);
        let mut updater = updater(1.0, None);
        updater
            .add_move(
                &registry,
                "jump",
                vec![id],
                Box::new(ConstantShapeMove::delta(vec![1.0]).unwrap()),
                None,
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let outcome = updater
                .trial(&mut context, &mut registry, &SerialCommunicator, &mut rng)
                .unwrap();
            assert_eq!(outcome, TrialOutcome::Rejected(RejectionReason::Metropolis));
        }
        assert_eq!(registry.get(id).unwrap().value.to_bits(), start.to_bits());
        assert_eq!(registry.phase(), RegistryPhase::Idle);
        assert_eq!(context.commits, 0);
        assert_eq!(updater.total_statistics().rejected(), 50);
    }

    #[test]
    fn non_finite_energy_is_rejected_and_counted() {
        let (mut registry, id) = single_dof(1.0);
        let momentum = 0.1 + 0.2;
        registry.set_momentum(id, momentum).unwrap();
        let mut context = HarmonicContext::new().with_particles(vec![
            Point3::new(0.1, 0.2, 0.3),
            Point3::new(-0.4, 0.5, -0.6),
        ]);
        context.velocities[1] = Vector3::new(0.7, -0.8, 0.9);
        context.displacements = vec![ParticleUpdate {
            index: 1,
            position: Point3::new(2.0, 2.0, 2.0),
            velocity: Vector3::new(-1.0, 0.0, 1.0),
        }];
        context.energy_offset = f64::NAN;
        let positions = context.positions.clone();
        let velocities = context.velocities.clone();
        let mut updater = updater(1.0, None);
        updater
            .add_move(
                &registry,
                "walk",
                vec![id],
                Box::new(ExternalShapeMove::random_walk(Domain::unbounded())),
                None,
            )
            .unwrap();

        let outcome = updater
            .trial(
                &mut context,
                &mut registry,
                &SerialCommunicator,
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap();
        assert_eq!(
            outcome,
            TrialOutcome::Rejected(RejectionReason::NonFiniteEnergy)
        );
        let snapshot = registry.get(id).unwrap();
        assert_eq!(snapshot.value.to_bits(), 1.0f64.to_bits());
        assert_eq!(snapshot.momentum.to_bits(), momentum.to_bits());
        let bits = |v: &Vector3<f64>| [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()];
        for (now, before) in context.positions.iter().zip(&positions) {
            assert_eq!(bits(&now.coords), bits(&before.coords));
        }
        for (now, before) in context.velocities.iter().zip(&velocities) {
            assert_eq!(bits(now), bits(before));
        }
        assert_eq!(context.commits, 0);
        assert_eq!(registry.phase(), RegistryPhase::Idle);
        let counts = updater.total_statistics();
        assert_eq!(counts.attempted, 1);
        assert_eq!(counts.rejected(), 1);
    }

    #[test]
    fn invalid_proposals_are_rejections_not_errors() {
        let (mut registry, id) = single_dof(0.5);
        let mut context = HarmonicContext::new();
        let mut updater = updater(1.0, None);
        updater
            .add_move(
                &registry,
                "escape",
                vec![id],
                Box::new(ExternalShapeMove::new("escape", Domain::unit(), |c, _, _| {
                    c.iter().map(|v| v + 5.0).collect()
                })),
                None,
            )
            .unwrap();

        let outcome = updater
            .trial(
                &mut context,
                &mut registry,
                &SerialCommunicator,
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap();
        assert_eq!(
            outcome,
            TrialOutcome::Rejected(RejectionReason::InvalidProposal)
        );
        assert_eq!(registry.get(id).unwrap().value, 0.5);
        assert_eq!(updater.statistics_for("escape").unwrap().attempted, 1);
    }

    fn gyroid_updater(tolerance: f64, iterations: usize) -> ShapeUpdater {
        let gyroid = Gyroid::new([1, 1, 1], [TAU; 3], 0.0).unwrap();
        let constraint = ManifoldConstraint::new(
            Arc::new(gyroid),
            ProjectionConfig {
                constraint_tolerance: tolerance,
                max_projection_iterations: iterations,
            },
        )
        .unwrap();
        updater(1.0, None).with_constraint(constraint)
    }

    #[test]
    fn trial_displacements_are_projected_and_committed_on_acceptance() {
        let (mut registry, id) = single_dof(1.0);
        let mut context = HarmonicContext::new().with_particles(vec![Point3::origin()]);
        context.displacements = vec![ParticleUpdate {
            index: 0,
            position: Point3::new(0.05, -0.02, 0.03),
            velocity: Vector3::new(1.0, 0.0, 0.0),
        }];
        let mut updater = gyroid_updater(1e-10, 50);
        updater
            .add_move(
                &registry,
                "shift",
                vec![id],
                Box::new(ConstantShapeMove::delta(vec![0.1]).unwrap()),
                None,
            )
            .unwrap();

        let accepted = updater
            .update(
                &mut context,
                &mut registry,
                &SerialCommunicator,
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap();
        assert!(accepted);
        assert_eq!(context.commits, 1);
        let constraint = updater.constraint().unwrap();
        assert!(constraint.is_satisfied(&context.positions[0]));
        let normal = constraint.manifold().gradient(&context.positions[0]);
        assert!(context.velocities[0].dot(&normal).abs() < 1e-12);
    }

    #[test]
    fn projection_failure_rejects_the_trial() {
        let (mut registry, id) = single_dof(1.0);
        let mut context = HarmonicContext::new().with_particles(vec![Point3::origin()]);
        context.displacements = vec![ParticleUpdate {
            index: 0,
            position: Point3::new(0.4, 0.6, 0.8),
            velocity: Vector3::zeros(),
        }];
        let mut updater = gyroid_updater(1e-14, 1);
        updater
            .add_move(
                &registry,
                "shift",
                vec![id],
                Box::new(ConstantShapeMove::delta(vec![0.1]).unwrap()),
                None,
            )
            .unwrap();

        let outcome = updater
            .trial(
                &mut context,
                &mut registry,
                &SerialCommunicator,
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap();
        assert_eq!(
            outcome,
            TrialOutcome::Rejected(RejectionReason::ConstraintFailure)
        );
        assert_eq!(registry.get(id).unwrap().value, 1.0);
        assert_eq!(context.positions[0], Point3::origin());
    }

    #[test]
    fn workers_reach_identical_decisions() {
        let handles: Vec<_> = LocalGroup::new(3)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let (mut registry, id) = single_dof(0.0);
                    let mut context = HarmonicContext::new().with_well(id, 1.0 / 3.0, 0.0);
                    let mut updater = updater(0.5, None);
                    updater
                        .add_move(
                            &registry,
                            "walk",
                            vec![id],
                            Box::new(ExternalShapeMove::random_walk(Domain::unbounded())),
                            Some(0.8),
                        )
                        .unwrap();
                    // Only the root's stream may influence the outcome.
                    let mut rng = StdRng::seed_from_u64(1000 + comm.rank() as u64);
                    let mut decisions = Vec::new();
                    for _ in 0..300 {
                        decisions.push(
                            updater
                                .update(&mut context, &mut registry, &comm, &mut rng)
                                .unwrap(),
                        );
                    }
                    (decisions, registry.get(id).unwrap().value.to_bits())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results[0].0.iter().any(|&d| d));
        assert!(results[0].0.iter().any(|&d| !d));
        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
    }

    #[test]
    fn tuning_keeps_move_size_within_bounds() {
        let (mut registry, id) = single_dof(0.0);
        let fixed_id = registry
            .attach(DofSpec::new(DofTarget::Type("B".to_string()), "diameter", 0.0))
            .unwrap();
        let mut context = HarmonicContext::new().with_well(id, 50.0, 0.0);
        let tuning = TuningConfig {
            target_acceptance_ratio: 0.3,
            tune_interval: 50,
            max_scale_adjustment: 1.5,
            min_move_size: 0.01,
            max_move_size: 0.5,
        };
        let mut updater = updater(1.0, Some(tuning));
        updater
            .add_move(
                &registry,
                "walk",
                vec![id],
                Box::new(ExternalShapeMove::random_walk(Domain::unbounded())),
                Some(0.5),
            )
            .unwrap();
        updater
            .add_move(
                &registry,
                "fixed",
                vec![fixed_id],
                Box::new(ConstantShapeMove::delta(vec![0.0]).unwrap()),
                Some(0.2),
            )
            .unwrap();

        let mut rng = StdRng::seed_from_u64(8);
        let mut sizes = Vec::new();
        for _ in 0..5_000 {
            updater
                .update(&mut context, &mut registry, &SerialCommunicator, &mut rng)
                .unwrap();
            sizes.push(updater.statistics_for("walk").unwrap().move_size);
        }
        assert!(sizes.iter().all(|&s| (0.01..=0.5).contains(&s)));
        assert!(sizes.iter().any(|&s| s < 0.5));
        assert_eq!(updater.statistics_for("fixed").unwrap().move_size, 0.2);
    }

    #[test]
    fn add_move_validates_its_arguments() {
        let (mut registry, id) = single_dof(0.0);
        let mut updater = updater(1.0, None);
        let walk = || Box::new(ExternalShapeMove::random_walk(Domain::unbounded()));

        updater.add_move(&registry, "walk", vec![id], walk(), None).unwrap();
        assert!(matches!(
            updater.add_move(&registry, "walk", vec![id], walk(), None),
            Err(EngineError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            updater.add_move(&registry, "empty", vec![], walk(), None),
            Err(EngineError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            updater.add_move(&registry, "scale", vec![id], walk(), Some(0.0)),
            Err(EngineError::InvalidConfiguration { .. })
        ));

        let stale = registry
            .attach(DofSpec::new(DofTarget::Particle(9), "radius", 1.0))
            .unwrap();
        registry.detach(stale).unwrap();
        assert!(matches!(
            updater.add_move(&registry, "stale", vec![stale], walk(), None),
            Err(EngineError::DofNotFound(_))
        ));
        assert_eq!(updater.moves().len(), 1);
    }

    #[test]
    fn update_without_moves_is_an_invalid_state() {
        let (mut registry, _) = single_dof(0.0);
        let mut context = HarmonicContext::new();
        let mut updater = updater(1.0, None);
        assert!(matches!(
            updater.update(
                &mut context,
                &mut registry,
                &SerialCommunicator,
                &mut StdRng::seed_from_u64(1)
            ),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn read_only_views_report_current_values_and_counts() {
        let (mut registry, id) = single_dof(2.0);
        let mut context = HarmonicContext::new();
        let mut updater = updater(1.0, None);
        updater
            .add_move(
                &registry,
                "grow",
                vec![id],
                Box::new(ConstantShapeMove::target(vec![3.0]).unwrap()),
                None,
            )
            .unwrap();
        assert_eq!(
            updater.type_params(&registry).unwrap(),
            vec![("grow".to_string(), vec![2.0])]
        );

        // A flat energy surface accepts every trial.
        updater
            .update(
                &mut context,
                &mut registry,
                &SerialCommunicator,
                &mut StdRng::seed_from_u64(1),
            )
            .unwrap();
        assert_eq!(
            updater.type_params(&registry).unwrap(),
            vec![("grow".to_string(), vec![3.0])]
        );
        assert_eq!(
            updater.total_statistics(),
            MoveCounts {
                attempted: 1,
                accepted: 1
            }
        );
        assert_eq!(updater.statistics()[0].0, "grow");
    }

    #[test]
    fn temperature_is_validated() {
        let mut updater = updater(1.0, None);
        updater.set_temperature(2.5).unwrap();
        assert_eq!(updater.temperature(), 2.5);
        assert!(updater.set_temperature(0.0).is_err());
        assert!(updater.set_temperature(f64::NAN).is_err());
        assert_eq!(updater.temperature(), 2.5);
    }
}

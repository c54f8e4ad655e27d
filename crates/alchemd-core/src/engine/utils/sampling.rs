use rand::Rng;
use tracing::instrument;

/// `min(1, exp(-ΔE/kT))`, or zero when the energy change is not finite.
pub fn acceptance_probability(delta_energy: f64, kt: f64) -> f64 {
    if delta_energy.is_nan() || delta_energy == f64::INFINITY {
        return 0.0;
    }
    if delta_energy <= 0.0 {
        return 1.0;
    }
    (-delta_energy / kt).exp()
}

/// The Metropolis test. Exactly one uniform variate is drawn per call, whatever the outcome,
/// so the random stream advances identically for accepted and rejected trials. Non-finite
/// energy changes are never accepted.
#[instrument(level = "trace", skip(rng))]
pub fn metropolis_criterion<R>(delta_energy: f64, kt: f64, rng: &mut R) -> bool
where
    R: Rng + ?Sized,
{
    let u: f64 = rng.gen_range(0.0..1.0);
    if !delta_energy.is_finite() {
        return false;
    }
    delta_energy <= 0.0 || u < acceptance_probability(delta_energy, kt)
}

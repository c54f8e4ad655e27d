use super::config::{ConfigError, ProjectionConfig};
use super::context::ParticleState;
use super::error::EngineError;
use crate::core::manifold::Manifold;
use nalgebra::{Point3, Vector3};
use std::sync::Arc;
use thiserror::Error;
use tracing::{instrument, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConstraintError {
    #[error("Projection did not converge after {iterations} iterations (|g| = {residual:e})")]
    NotConverged { iterations: usize, residual: f64 },

    #[error("Projection produced a non-finite position")]
    NonFinite,
}

/// Keeps particles on the zero level set of a manifold.
///
/// Positions are corrected RATTLE style: the displacement is a multiple of the gradient at the
/// unconstrained position, with the multiplier found by Newton iteration. Velocities are then
/// made tangential at the corrected position.
#[derive(Debug, Clone)]
pub struct ManifoldConstraint {
    manifold: Arc<dyn Manifold>,
    config: ProjectionConfig,
}

impl ManifoldConstraint {
    pub fn new(manifold: Arc<dyn Manifold>, config: ProjectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { manifold, config })
    }

    pub fn manifold(&self) -> &Arc<dyn Manifold> {
        &self.manifold
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    #[inline]
    pub fn is_satisfied(&self, position: &Point3<f64>) -> bool {
        self.manifold.evaluate(position).abs() <= self.config.constraint_tolerance
    }

    pub fn project(
        &self,
        position: &Point3<f64>,
        velocity: &Vector3<f64>,
    ) -> Result<(Point3<f64>, Vector3<f64>), ConstraintError> {
        let corrected = self.project_position(position)?;
        Ok((corrected, self.tangential_velocity(&corrected, velocity)))
    }

    pub fn project_position(&self, position: &Point3<f64>) -> Result<Point3<f64>, ConstraintError> {
        let tolerance = self.config.constraint_tolerance;
        let residual = self.manifold.evaluate(position);
        if !residual.is_finite() {
            return Err(ConstraintError::NonFinite);
        }
        if residual.abs() <= tolerance {
            return Ok(*position);
        }

        let normal = self.manifold.gradient(position);
        let mut lambda = 0.0;
        let mut current = *position;
        let mut g = residual;

        for iteration in 0..self.config.max_projection_iterations {
            let slope = self.manifold.gradient(&current).dot(&normal);
            if !(slope.abs() > f64::EPSILON) {
                return Err(ConstraintError::NotConverged {
                    iterations: iteration,
                    residual: g.abs(),
                });
            }
            lambda -= g / slope;
            current = position + normal * lambda;
            g = self.manifold.evaluate(&current);
            if !g.is_finite() || !current.coords.iter().all(|c| c.is_finite()) {
                return Err(ConstraintError::NonFinite);
            }
            if g.abs() <= tolerance {
                trace!(iterations = iteration + 1, residual = g, "Projection converged");
                return Ok(current);
            }
        }

        Err(ConstraintError::NotConverged {
            iterations: self.config.max_projection_iterations,
            residual: g.abs(),
        })
    }

    /// Removes the component of `velocity` along the surface normal at `position`.
    pub fn tangential_velocity(
        &self,
        position: &Point3<f64>,
        velocity: &Vector3<f64>,
    ) -> Vector3<f64> {
        let normal = self.manifold.gradient(position);
        let norm_squared = normal.norm_squared();
        if norm_squared > 0.0 {
            velocity - normal * (velocity.dot(&normal) / norm_squared)
        } else {
            *velocity
        }
    }

    /// Projects the listed particles of `state` in place. A failure is fatal here: the state is
    /// left partially projected and the error is returned.
    #[instrument(level = "trace", skip_all)]
    pub fn constrain_particles<S, I>(&self, state: &mut S, indices: I) -> Result<(), EngineError>
    where
        S: ParticleState + ?Sized,
        I: IntoIterator<Item = usize>,
    {
        for index in indices {
            let (position, velocity) =
                self.project(&state.position(index), &state.velocity(index))?;
            state.set_position(index, position);
            state.set_velocity(index, velocity);
        }
        Ok(())
    }

    /// Projects many phase-space points, in parallel when the `parallel` feature is enabled.
    pub fn project_batch(
        &self,
        points: &[(Point3<f64>, Vector3<f64>)],
    ) -> Vec<Result<(Point3<f64>, Vector3<f64>), ConstraintError>> {
        #[cfg(feature = "parallel")]
        let iter = points.par_iter();
        #[cfg(not(feature = "parallel"))]
        let iter = points.iter();

        iter.map(|(position, velocity)| self.project(position, velocity))
            .collect()
    }
}

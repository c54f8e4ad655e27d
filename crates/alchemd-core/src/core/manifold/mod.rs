//! # Manifold Module
//!
//! Implicit surfaces `g(x) = 0` that particles can be confined to. Every surface provides its
//! value and a closed-form gradient; no manifold relies on numerical differentiation.
//!
//! ## Key Components
//!
//! - [`Manifold`] - The capability shared by all surfaces
//! - [`periodic::PeriodicLattice`] - Wavevector bookkeeping for triply periodic surfaces
//! - [`gyroid::Gyroid`], [`diamond::Diamond`], [`primitive::Primitive`] - Triply periodic minimal
//!   surfaces parametrized by three integer periodicity counts and an offset `epsilon`
//! - [`ManifoldSpec`] - A serializable description used by configuration layers to build a
//!   shared, immutable manifold
//!
//! Projection of particles onto a surface lives in [`crate::engine::constraint`].

pub mod diamond;
pub mod gyroid;
pub mod periodic;
pub mod primitive;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// An implicit surface with an analytic gradient.
///
/// Implementations are immutable after construction and are shared read-only between every
/// particle subject to the constraint, hence the `Send + Sync` bound.
pub trait Manifold: fmt::Debug + Send + Sync {
    /// Short lowercase name of the surface family (e.g., "gyroid").
    fn name(&self) -> &'static str;

    /// The implicit function `g(x)`; the surface is its zero level set.
    fn evaluate(&self, position: &Point3<f64>) -> f64;

    /// The analytic gradient `∇g(x)`.
    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64>;
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ManifoldError {
    #[error("Periodicity count along {axis} must be non-zero")]
    ZeroPeriodicity { axis: char },

    #[error("Box length along {axis} must be positive and finite, got {length}")]
    InvalidBoxLength { axis: char, length: f64 },

    #[error("Offset epsilon must be finite, got {0}")]
    InvalidEpsilon(f64),
}

/// The family of triply periodic surface to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ManifoldKind {
    Gyroid,
    Diamond,
    Primitive,
}

impl fmt::Display for ManifoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManifoldKind::Gyroid => "gyroid",
            ManifoldKind::Diamond => "diamond",
            ManifoldKind::Primitive => "primitive",
        };
        f.write_str(name)
    }
}

/// A serializable description of a triply periodic manifold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifoldSpec {
    pub kind: ManifoldKind,
    /// Number of unit cells of the surface along each box axis.
    pub n: [i32; 3],
    /// Edge lengths of the periodic box.
    pub box_lengths: [f64; 3],
    /// Offset of the level set; zero yields the minimal surface itself.
    #[serde(default)]
    pub epsilon: f64,
}

impl ManifoldSpec {
    pub fn build(&self) -> Result<Arc<dyn Manifold>, ManifoldError> {
        let manifold: Arc<dyn Manifold> = match self.kind {
            ManifoldKind::Gyroid => Arc::new(gyroid::Gyroid::new(
                self.n,
                self.box_lengths,
                self.epsilon,
            )?),
            ManifoldKind::Diamond => Arc::new(diamond::Diamond::new(
                self.n,
                self.box_lengths,
                self.epsilon,
            )?),
            ManifoldKind::Primitive => Arc::new(primitive::Primitive::new(
                self.n,
                self.box_lengths,
                self.epsilon,
            )?),
        };
        Ok(manifold)
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::Manifold;
    use nalgebra::{Point3, Vector3};

    const STEP: f64 = 1e-6;

    pub fn assert_gradient_matches_finite_difference(
        manifold: &dyn Manifold,
        points: &[Point3<f64>],
    ) {
        for p in points {
            let analytic = manifold.gradient(p);
            for axis in 0..3 {
                let mut h = Vector3::zeros();
                h[axis] = STEP;
                let numeric =
                    (manifold.evaluate(&(p + h)) - manifold.evaluate(&(p - h))) / (2.0 * STEP);
                assert!(
                    (analytic[axis] - numeric).abs() < 1e-6,
                    "{} gradient mismatch at {:?} along axis {}: analytic {} vs numeric {}",
                    manifold.name(),
                    p,
                    axis,
                    analytic[axis],
                    numeric
                );
            }
        }
    }

    pub fn sample_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.3, 1.7, -2.2),
            Point3::new(4.1, 0.2, 3.3),
            Point3::new(-1.5, -0.7, 0.9),
            Point3::new(2.5, 2.5, 2.5),
        ]
    }
}

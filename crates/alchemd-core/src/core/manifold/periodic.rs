use super::ManifoldError;
use nalgebra::{Point3, Vector3};
use std::f64::consts::TAU;

const AXES: [char; 3] = ['x', 'y', 'z'];

/// Periodicity data shared by the triply periodic surfaces.
///
/// A surface with `n` unit cells along an axis of length `L` oscillates with wavenumber
/// `k = 2π·n / L` along that axis, so that the surface tiles the periodic box exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicLattice {
    n: [i32; 3],
    epsilon: f64,
    wavevector: Vector3<f64>,
}

impl PeriodicLattice {
    pub fn new(n: [i32; 3], box_lengths: [f64; 3], epsilon: f64) -> Result<Self, ManifoldError> {
        let mut wavevector = Vector3::zeros();
        for axis in 0..3 {
            if n[axis] == 0 {
                return Err(ManifoldError::ZeroPeriodicity { axis: AXES[axis] });
            }
            let length = box_lengths[axis];
            if !length.is_finite() || length <= 0.0 {
                return Err(ManifoldError::InvalidBoxLength {
                    axis: AXES[axis],
                    length,
                });
            }
            wavevector[axis] = TAU * f64::from(n[axis]) / length;
        }
        if !epsilon.is_finite() {
            return Err(ManifoldError::InvalidEpsilon(epsilon));
        }
        Ok(Self {
            n,
            epsilon,
            wavevector,
        })
    }

    pub fn n(&self) -> [i32; 3] {
        self.n
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn wavevector(&self) -> &Vector3<f64> {
        &self.wavevector
    }

    /// Scaled coordinates `(kx·x, ky·y, kz·z)`.
    #[inline]
    pub fn phases(&self, position: &Point3<f64>) -> Vector3<f64> {
        position.coords.component_mul(&self.wavevector)
    }
}

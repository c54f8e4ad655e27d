use super::periodic::PeriodicLattice;
use super::{Manifold, ManifoldError};
use nalgebra::{Point3, Vector3};

/// Schwarz P ("primitive") surface, `g(x) = cos(kx·x) + cos(ky·y) + cos(kz·z) − ε`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Primitive {
    lattice: PeriodicLattice,
}

impl Primitive {
    pub fn new(n: [i32; 3], box_lengths: [f64; 3], epsilon: f64) -> Result<Self, ManifoldError> {
        Ok(Self {
            lattice: PeriodicLattice::new(n, box_lengths, epsilon)?,
        })
    }

    pub fn n(&self) -> [i32; 3] {
        self.lattice.n()
    }

    pub fn epsilon(&self) -> f64 {
        self.lattice.epsilon()
    }
}

impl Manifold for Primitive {
    fn name(&self) -> &'static str {
        "primitive"
    }

    fn evaluate(&self, position: &Point3<f64>) -> f64 {
        let q = self.lattice.phases(position);
        q.x.cos() + q.y.cos() + q.z.cos() - self.lattice.epsilon()
    }

    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64> {
        let q = self.lattice.phases(position);
        let k = self.lattice.wavevector();
        Vector3::new(-k.x * q.x.sin(), -k.y * q.y.sin(), -k.z * q.z.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifold::test_utils::{
        assert_gradient_matches_finite_difference, sample_points,
    };
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn known_point_lies_on_the_surface() {
        let primitive = Primitive::new([1, 1, 1], [2.0 * PI, 2.0 * PI, 2.0 * PI], 0.0).unwrap();
        let p = Point3::new(FRAC_PI_2, FRAC_PI_2, FRAC_PI_2);
        assert!(primitive.evaluate(&p).abs() < 1e-12);
    }

    #[test]
    fn gradient_vanishes_at_cell_corner() {
        let primitive = Primitive::new([1, 1, 1], [5.0, 5.0, 5.0], 0.0).unwrap();
        assert!(primitive.gradient(&Point3::origin()).norm() < 1e-12);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let primitive = Primitive::new([2, 1, 1], [10.0, 10.0, 7.0], 0.3).unwrap();
        assert_gradient_matches_finite_difference(&primitive, &sample_points());
    }
}

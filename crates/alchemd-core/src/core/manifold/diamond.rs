use super::periodic::PeriodicLattice;
use super::{Manifold, ManifoldError};
use nalgebra::{Point3, Vector3};

/// Schwarz D ("diamond") surface,
/// `g(x) = cos(kx·x)cos(ky·y)cos(kz·z) − sin(kx·x)sin(ky·y)sin(kz·z) − ε`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Diamond {
    lattice: PeriodicLattice,
}

impl Diamond {
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

impl Manifold for Diamond {
    fn name(&self) -> &'static str {
        "diamond"
    }

    fn evaluate(&self, position: &Point3<f64>) -> f64 {
        let q = self.lattice.phases(position);
        q.x.cos() * q.y.cos() * q.z.cos() - q.x.sin() * q.y.sin() * q.z.sin()
            - self.lattice.epsilon()
    }

    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64> {
        let q = self.lattice.phases(position);
        let k = self.lattice.wavevector();
        let (sx, cx) = q.x.sin_cos();
        let (sy, cy) = q.y.sin_cos();
        let (sz, cz) = q.z.sin_cos();
        Vector3::new(
            -k.x * (sx * cy * cz + cx * sy * sz),
            -k.y * (cx * sy * cz + sx * cy * sz),
            -k.z * (cx * cy * sz + sx * sy * cz),
        )
    }
}

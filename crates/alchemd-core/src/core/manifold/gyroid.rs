use super::periodic::PeriodicLattice;
use super::{Manifold, ManifoldError};
use nalgebra::{Point3, Vector3};

/// Schoen's gyroid,
/// `g(x) = sin(kx·x)cos(ky·y) + sin(ky·y)cos(kz·z) + sin(kz·z)cos(kx·x) − ε`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gyroid {
    lattice: PeriodicLattice,
}

impl Gyroid {
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

impl Manifold for Gyroid {
    fn name(&self) -> &'static str {
        "gyroid"
    }

    fn evaluate(&self, position: &Point3<f64>) -> f64 {
        let q = self.lattice.phases(position);
        q.x.sin() * q.y.cos() + q.y.sin() * q.z.cos() + q.z.sin() * q.x.cos()
            - self.lattice.epsilon()
    }

    fn gradient(&self, position: &Point3<f64>) -> Vector3<f64> {
        let q = self.lattice.phases(position);
        let k = self.lattice.wavevector();
        let (sx, cx) = q.x.sin_cos();
        let (sy, cy) = q.y.sin_cos();
        let (sz, cz) = q.z.sin_cos();
        Vector3::new(
            k.x * (cx * cy - sz * sx),
            k.y * (cy * cz - sx * sy),
            k.z * (cz * cx - sy * sz),
        )
    }
}

//! # Core Module
//!
//! Stateless building blocks shared by every stateful component of ALCHEMD.
//!
//! ## Architecture
//!
//! - **Degree-of-Freedom Models** ([`models`]) - Alchemical parameter records, their targets, and handles
//! - **Manifolds** ([`manifold`]) - Implicit surfaces `g(x) = 0` with closed-form gradients
//! - **Shape Moves** ([`moves`]) - Trial-perturbation strategies used by Monte Carlo sampling
//!
//! Nothing in this module mutates simulation state; the [`crate::engine`] layer decides when
//! and how the values produced here are applied.

pub mod manifold;
pub mod models;
pub mod moves;

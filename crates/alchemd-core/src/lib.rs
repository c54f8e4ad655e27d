//! # ALCHEMD Core Library
//!
//! Alchemical degrees of freedom for molecular simulation: continuous parameters bound to
//! particles or particle types that shape their interactions, evolved alongside the spatial
//! dynamics of an externally owned simulation.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture so that the mathematics, the stateful
//! machinery, and the reference harness stay separate.
//!
//! - **[`core`]: The Foundation.** Stateless models: alchemical degree-of-freedom records,
//!   implicit-surface manifolds with analytic gradients, and pluggable shape-move generators.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer. It owns the degree-of-freedom
//!   registry, the multi-rate `AlchemostatIntegrator`, the Monte Carlo `ShapeUpdater`, RATTLE
//!   style manifold projection, statistics, checkpoints, and the collective-communication
//!   contract that keeps parallel workers in agreement.
//!
//! - **[`workflows`]: The Reference Harness.** A small closed simulation context and a driver
//!   that exercise every engine component together.

pub mod core;
pub mod engine;
pub mod workflows;

//! # Engine Module
//!
//! The stateful layer of ALCHEMD: it owns the alchemical degrees of freedom and evolves them
//! alongside an externally owned particle simulation.
//!
//! ## Overview
//!
//! Alchemical parameters are advanced in two complementary ways. The
//! [`alchemostat::AlchemostatIntegrator`] treats each parameter as a dynamical variable with
//! a fictitious mass and integrates it by velocity Verlet on its own multi-rate schedule. The
//! [`updater::ShapeUpdater`] samples parameters by Metropolis Monte Carlo using pluggable
//! shape moves. Both read the host system only through the [`context::SimulationContext`]
//! trait and agree across parallel workers through the [`comm::Communicator`] contract.
//!
//! ## Architecture
//!
//! - **Registry** ([`registry`]) - The single owner of every alchemical value and momentum
//! - **Alchemostat** ([`alchemostat`]) - Multi-rate velocity Verlet integration
//! - **Shape Updater** ([`updater`]) - Monte Carlo trials, acceptance statistics, and tuning
//! - **Manifold Constraint** ([`constraint`]) - RATTLE style projection onto implicit surfaces
//! - **Collectives** ([`comm`]) - Reductions and broadcasts that keep workers in lock step
//! - **Checkpoints** ([`checkpoint`]) - Persisted state for bit-identical continuation
//! - **Configuration** ([`config`]) - Validated settings and their builders
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - The engine error taxonomy
//!
//! ## Key Capabilities
//!
//! - **Deterministic parallel sampling**: only the root worker draws random numbers
//! - **Transactional trials**: a rejected trial leaves every value bit-identical
//! - **Adaptive move sizes** tuned toward a target acceptance ratio

pub mod alchemostat;
pub mod checkpoint;
pub mod comm;
pub mod config;
pub mod constraint;
pub mod context;
pub mod error;
pub mod progress;
pub mod registry;
pub mod statistics;
pub(crate) mod transaction;
pub mod updater;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

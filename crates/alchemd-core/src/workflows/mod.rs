//! # Workflows Module
//!
//! High-level drivers that assemble the engine components into a running system.
//!
//! ## Overview
//!
//! The production simulation loop belongs to the host application. This module provides a
//! small, closed reference system instead: tethered particles that may be confined to a triply
//! periodic manifold, alchemical values in harmonic wells, an optional breathing parameter that
//! rescales every particle, and a driver that advances all of them together. It backs the
//! command-line runner and exercises every engine component end to end.
//!
//! ## Architecture
//!
//! - **Sandbox Workflow** ([`sandbox`]) - Configuration, the worker-local system, its
//!   constrained particle integrator, checkpoints, and the run loop.

pub mod sandbox;

//! Utility functions for the engine module.
//!
//! Helpers shared by the stateful components, currently the Metropolis acceptance test used by
//! the shape updater.

pub mod sampling;

//! Data models for alchemical degrees of freedom.
//!
//! - [`ids`] - Generational handles issued by the registry
//! - [`dof`] - The degree-of-freedom record, its attach-time specification, and its target

pub mod dof;
pub mod ids;

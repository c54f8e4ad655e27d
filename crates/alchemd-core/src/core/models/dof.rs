use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies what an alchemical degree of freedom is bound to.
///
/// A parameter may belong to a single particle (for example, the radius of one sphere) or to
/// every particle of a type (for example, the shared shape of all type-`A` particles). Values of
/// type-bound parameters are logically global: every worker that holds a particle of that type
/// sees the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DofTarget {
    /// A single particle, identified by its global tag.
    Particle(usize),
    /// Every particle of the named type.
    Type(String),
}

impl fmt::Display for DofTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DofTarget::Particle(tag) => write!(f, "particle {}", tag),
            DofTarget::Type(name) => write!(f, "type '{}'", name),
        }
    }
}

impl FromStr for DofTarget {
    type Err = ();

    /// Parses `particle:<tag>` or `type:<name>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s.trim().split_once(':').ok_or(())?;
        let rest = rest.trim();
        match kind.trim().to_lowercase().as_str() {
            "particle" | "p" => rest.parse().map(DofTarget::Particle).map_err(|_| ()),
            "type" | "t" if !rest.is_empty() => Ok(DofTarget::Type(rest.to_string())),
            _ => Err(()),
        }
    }
}

/// The attach-time description of a new alchemical degree of freedom.
///
/// A spec is validated by the registry when it is attached; construction itself never fails so
/// that specs can be assembled incrementally from configuration files.
#[derive(Debug, Clone, PartialEq)]
pub struct DofSpec {
    /// The particle or particle type that owns the parameter.
    pub target: DofTarget,
    /// The name of the tunable parameter (e.g., "diameter").
    pub parameter: String,
    /// Initial value of the parameter.
    pub value: f64,
    /// Initial conjugate momentum.
    pub momentum: f64,
    /// Effective mass used by the alchemostat. Must be positive.
    pub mass: f64,
    /// Number of primary timesteps per alchemical step. Must be at least one.
    pub period: u64,
}

impl DofSpec {
    /// Creates a spec at rest with unit mass and a multi-rate factor of one.
    pub fn new(target: DofTarget, parameter: impl Into<String>, value: f64) -> Self {
        Self {
            target,
            parameter: parameter.into(),
            value,
            momentum: 0.0,
            mass: 1.0,
            period: 1,
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_period(mut self, period: u64) -> Self {
        self.period = period;
        self
    }
}

/// A read-only view of the dynamic state of one degree of freedom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DofSnapshot {
    pub value: f64,
    pub momentum: f64,
}

/// An alchemical degree of freedom held by the registry.
///
/// The value and momentum are only ever written by the alchemostat integrator or, for the value,
/// by an accepted shape move. Mass and period are fixed for the lifetime of the record.
#[derive(Debug, Clone, PartialEq)]
pub struct AlchemicalDof {
    /// The particle or particle type that owns the parameter.
    pub target: DofTarget,
    /// The name of the tunable parameter.
    pub parameter: String,
    /// Current value of the parameter.
    pub value: f64,
    /// Current conjugate momentum.
    pub momentum: f64,
    /// Effective mass in parameter space.
    pub mass: f64,
    /// Multi-rate factor, in primary timesteps per alchemical step.
    pub period: u64,
}

impl AlchemicalDof {
    pub(crate) fn from_spec(spec: DofSpec) -> Self {
        Self {
            target: spec.target,
            parameter: spec.parameter,
            value: spec.value,
            momentum: spec.momentum,
            mass: spec.mass,
            period: spec.period,
        }
    }

    pub fn snapshot(&self) -> DofSnapshot {
        DofSnapshot {
            value: self.value,
            momentum: self.momentum,
        }
    }

    /// Kinetic energy `p² / 2m` carried by the parameter's momentum.
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.momentum * self.momentum / self.mass
    }
}

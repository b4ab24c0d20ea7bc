use crate::error::EnvError;
use crate::rl::EnvRegistry;

/// Environment families, each with its own construction style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvFamily {
    /// Tabular bin-packing environments.
    Binpacking,
    /// Rigid-body physics simulations.
    Physics,
    /// Robotic simulator environments.
    Robotics,
    /// Sequence-folding (inverse design) environments.
    Sequence,
    /// Anything resolvable through the generic environment registry.
    Generic,
}

impl EnvFamily {
    /// Short tag used for directory names and family-level config fallbacks.
    pub fn tag(&self) -> &'static str {
        match self {
            EnvFamily::Binpacking => "binpacking",
            EnvFamily::Physics => "physics",
            EnvFamily::Robotics => "robotics",
            EnvFamily::Sequence => "sequence",
            EnvFamily::Generic => "generic",
        }
    }
}

impl std::fmt::Display for EnvFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Map an environment name to its family.
///
/// Domain keyword checks run first, in a fixed order; only a name matching
/// none of them is tried against the generic registry. A keyword match is
/// therefore never routed to the generic family, even if the registry also
/// knows the name.
pub fn classify(env_name: &str, envs: &EnvRegistry) -> Result<EnvFamily, EnvError> {
    let family = if env_name.contains("Packing") {
        EnvFamily::Binpacking
    } else if env_name.contains("Bullet") {
        EnvFamily::Physics
    } else if env_name.contains("Nao") || env_name.contains("Quadruped") {
        EnvFamily::Robotics
    } else if env_name.contains("Rna") {
        EnvFamily::Sequence
    } else if envs.contains(env_name) {
        EnvFamily::Generic
    } else {
        println!("{env_name} not found.");
        return Err(EnvError::Classification(env_name.to_string()));
    };
    Ok(family)
}

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Params, RunConfig};
use crate::data::ExpertData;
use crate::error::LookupError;
use crate::rl::{ActionSpace, Environment, Model, OrnsteinUhlenbeckNoise};

/// Where a policy lookup was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    /// The wrapped library's built-in policy table.
    Builtin,
    /// The project-local custom-policy table.
    Custom,
}

/// Identity of a resolved policy.
#[derive(Debug, Clone)]
pub struct Policy {
    pub name: String,
    pub source: PolicySource,
}

/// How policy hyperparameters are handed to the model constructor.
#[derive(Debug, Clone)]
pub enum PolicyArgs {
    /// Parameters forwarded directly.
    Flat(Params),
    /// Parameters wrapped one level deep, as custom policies expect.
    Nested(Params),
}

impl PolicyArgs {
    pub fn params(&self) -> &Params {
        match self {
            PolicyArgs::Flat(p) | PolicyArgs::Nested(p) => p,
        }
    }
}

/// An instantiated (opaque) policy network handed to model constructors.
pub trait PolicyObject: Send + Sync {
    fn name(&self) -> &str;
}

pub type PolicyCtor = Arc<dyn Fn(&PolicyArgs) -> Arc<dyn PolicyObject> + Send + Sync>;

/// Name-keyed policy constructors: the library's built-ins are consulted
/// first, the project-local custom table second.
#[derive(Default)]
pub struct PolicyRegistry {
    builtin: BTreeMap<String, PolicyCtor>,
    custom: BTreeMap<String, PolicyCtor>,
}

impl PolicyRegistry {
    pub fn register_builtin(&mut self, name: impl Into<String>, ctor: PolicyCtor) {
        self.builtin.insert(name.into(), ctor);
    }

    pub fn register_custom(&mut self, name: impl Into<String>, ctor: PolicyCtor) {
        self.custom.insert(name.into(), ctor);
    }

    pub fn get(&self, name: &str) -> Result<(Policy, PolicyCtor), LookupError> {
        if let Some(ctor) = self.builtin.get(name) {
            let policy = Policy {
                name: name.to_string(),
                source: PolicySource::Builtin,
            };
            return Ok((policy, ctor.clone()));
        }
        if let Some(ctor) = self.custom.get(name) {
            let policy = Policy {
                name: name.to_string(),
                source: PolicySource::Custom,
            };
            return Ok((policy, ctor.clone()));
        }
        Err(LookupError::Policy(name.to_string()))
    }
}

/// Everything a model constructor receives.
pub struct ModelInit {
    pub policy: Policy,
    pub policy_object: Arc<dyn PolicyObject>,
    pub policy_args: PolicyArgs,
    /// Model hyperparameters, forwarded verbatim from the config.
    pub params: Params,
    pub action_space: ActionSpace,
    pub n_envs: usize,
    /// Present only for off-policy actor-critic models.
    pub action_noise: Option<OrnsteinUhlenbeckNoise>,
    /// Present only for imitation-learning models.
    pub expert_data: Option<ExpertData>,
    pub tensorboard_log: PathBuf,
}

/// Everything a model loader receives.
pub struct ModelLoad {
    /// Path of the serialized model file.
    pub path: PathBuf,
    pub tensorboard_log: PathBuf,
}

pub type ModelCtor = Arc<dyn Fn(ModelInit) -> Result<Box<dyn Model>, String> + Send + Sync>;
pub type ModelLoader = Arc<dyn Fn(ModelLoad) -> Result<Box<dyn Model>, String> + Send + Sync>;

/// A registered model implementation: fresh construction plus checkpoint
/// deserialization.
#[derive(Clone)]
pub struct ModelSpec {
    pub create: ModelCtor,
    pub load: ModelLoader,
}

#[derive(Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn register(&mut self, name: impl Into<String>, spec: ModelSpec) {
        self.models.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Result<ModelSpec, LookupError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| LookupError::Model(name.to_string()))
    }
}

/// Inputs to a per-worker environment constructor. Which fields are set
/// depends on the environment family's construction style.
#[derive(Clone)]
pub struct EnvBuild {
    pub name: String,
    /// Shared run configuration (sequence family).
    pub config: Option<Arc<RunConfig>>,
    /// Per-worker salted seed (generic family).
    pub seed: Option<u64>,
    pub rank: usize,
}

pub type EnvCtorFn = Arc<dyn Fn(EnvBuild) -> Box<dyn Environment> + Send + Sync>;

#[derive(Default)]
pub struct EnvRegistry {
    envs: BTreeMap<String, EnvCtorFn>,
}

impl EnvRegistry {
    pub fn register(&mut self, name: impl Into<String>, ctor: EnvCtorFn) {
        self.envs.insert(name.into(), ctor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.envs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<EnvCtorFn> {
        self.envs.get(name).cloned()
    }
}

/// The explicit registry object passed to the factory and the session at
/// startup. No module-level registration state exists anywhere.
#[derive(Default)]
pub struct Registries {
    pub policies: PolicyRegistry,
    pub models: ModelRegistry,
    pub envs: EnvRegistry,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(String);
    impl PolicyObject for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    fn named_ctor(name: &'static str) -> PolicyCtor {
        Arc::new(move |_args| Arc::new(Named(name.to_string())))
    }

    #[test]
    fn test_builtin_policy_checked_before_custom() {
        let mut reg = PolicyRegistry::default();
        reg.register_custom("MlpPolicy", named_ctor("custom"));
        reg.register_builtin("MlpPolicy", named_ctor("builtin"));

        let (policy, ctor) = reg.get("MlpPolicy").unwrap();
        assert_eq!(policy.source, PolicySource::Builtin);
        let obj = ctor(&PolicyArgs::Flat(Params::new()));
        assert_eq!(obj.name(), "builtin");
    }

    #[test]
    fn test_custom_policy_fallback() {
        let mut reg = PolicyRegistry::default();
        reg.register_custom("CustomLstmPolicy", named_ctor("custom"));

        let (policy, _) = reg.get("CustomLstmPolicy").unwrap();
        assert_eq!(policy.source, PolicySource::Custom);
    }

    #[test]
    fn test_policy_lookup_not_found() {
        let reg = PolicyRegistry::default();
        assert!(matches!(
            reg.get("Nope"),
            Err(LookupError::Policy(name)) if name == "Nope"
        ));
    }

    #[test]
    fn test_model_lookup_not_found() {
        let reg = ModelRegistry::default();
        assert!(matches!(reg.get("Ppo"), Err(LookupError::Model(_))));
    }

    #[test]
    fn test_env_registry_membership() {
        let mut reg = EnvRegistry::default();
        assert!(!reg.contains("Stub-v0"));
        reg.register(
            "Stub-v0",
            Arc::new(|_build| -> Box<dyn Environment> { unimplemented!("not built in this test") }),
        );
        assert!(reg.contains("Stub-v0"));
        assert!(reg.get("Stub-v0").is_some());
    }
}

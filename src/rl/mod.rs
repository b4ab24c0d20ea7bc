//! The seam over the wrapped RL library: environment and model traits,
//! vectorized environment handles, name-keyed registries, and exploration
//! noise. The algorithms behind [`Model`] and the physics behind
//! [`Environment`] are external; this layer only defines the contract the
//! orchestration code drives.

pub mod builtin;
mod noise;
mod registry;
mod vec_env;

pub use noise::OrnsteinUhlenbeckNoise;
pub use registry::{
    EnvBuild, EnvCtorFn, EnvRegistry, ModelCtor, ModelInit, ModelLoad, ModelLoader, ModelRegistry,
    ModelSpec, Policy, PolicyArgs, PolicyCtor, PolicyObject, PolicyRegistry, PolicySource,
    Registries,
};
pub use vec_env::{DummyVecEnv, FrameStack, VecEnv, WorkerVecEnv};

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;

use crate::data::{Dataset, SolutionHandle};
use crate::error::{AttrError, TransportError};

/// A single observation vector.
pub type Obs = Vec<f32>;

/// Result of stepping one environment once.
#[derive(Debug, Clone)]
pub struct Step {
    pub obs: Obs,
    pub reward: f32,
    pub done: bool,
}

/// A continuous box action space.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpace {
    pub dim: usize,
    pub low: f32,
    pub high: f32,
}

impl ActionSpace {
    pub fn new(dim: usize, low: f32, high: f32) -> Self {
        ActionSpace { dim, low, high }
    }

    /// Draw a uniform random action.
    pub fn sample(&self, rng: &mut StdRng) -> Vec<f32> {
        (0..self.dim)
            .map(|_| rng.random_range(self.low..=self.high))
            .collect()
    }
}

/// A single simulation environment.
///
/// The attribute hooks are optional and default to
/// [`AttrError::Unsupported`], so callers see an explicit not-found result
/// instead of a swallowed failure when an environment family lacks one.
pub trait Environment: Send {
    fn reset(&mut self) -> Obs;
    fn step(&mut self, action: &[f32]) -> Step;
    fn action_space(&self) -> ActionSpace;

    fn set_dataset(&mut self, _dataset: Arc<Dataset>) -> Result<(), AttrError> {
        Err(AttrError::Unsupported("dataset"))
    }
    fn set_meta_learning(&mut self, _on: bool) -> Result<(), AttrError> {
        Err(AttrError::Unsupported("meta_learning"))
    }
    fn set_randomize(&mut self, _on: bool) -> Result<(), AttrError> {
        Err(AttrError::Unsupported("randomize"))
    }
    /// Advance to the next design target in the active dataset.
    fn next_target(&mut self) -> Result<(), AttrError> {
        Err(AttrError::Unsupported("next_target"))
    }
    /// The terminal solution of the most recently finished episode.
    fn prev_solution(&self) -> Result<SolutionHandle, AttrError> {
        Err(AttrError::Unsupported("prev_solution"))
    }
    /// Family-specific fill-rate log.
    fn fill_log(&self) -> Result<Vec<f64>, AttrError> {
        Err(AttrError::Unsupported("fill_log"))
    }
}

/// Deferred per-worker environment constructor. Invoked inside the worker
/// (thread) it will live on, never before.
pub type EnvCtor = Box<dyn FnOnce() -> Box<dyn Environment> + Send>;

/// Options forwarded to [`Model::learn`].
#[derive(Debug, Clone)]
pub struct LearnOptions {
    pub total_timesteps: u64,
    pub tb_log_name: String,
    pub reset_num_timesteps: bool,
    pub seed: u64,
}

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnOutcome {
    Completed,
    Interrupted,
}

/// An RL model bound to a policy. Construction and deserialization go
/// through the [`ModelRegistry`]; the session drives the instance.
pub trait Model: Send {
    fn name(&self) -> &str;

    /// Batched action selection, one action per worker observation.
    fn predict(&mut self, obs: &[Obs], deterministic: bool) -> Vec<Vec<f32>>;

    /// Run the training loop against `env` until the step budget is spent or
    /// `interrupt` is raised. Checked between rollouts; raising it yields
    /// [`LearnOutcome::Interrupted`] rather than an error.
    fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        opts: &LearnOptions,
        interrupt: &AtomicBool,
    ) -> Result<LearnOutcome, TransportError>;

    /// Serialize parameters to `path`.
    fn save(&self, path: &Path) -> std::io::Result<()>;
}

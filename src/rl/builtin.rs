//! Built-in backends: a random-action baseline model and a toy
//! sequence-match environment. They exercise the full orchestration path
//! (vectorization, datasets, solutions, checkpoints) without pulling in a
//! real learner or folding engine; production backends register alongside
//! them at startup.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::{Dataset, Sequence, Solution, SolutionHandle};
use crate::error::{AttrError, TransportError};
use crate::rl::{
    ActionSpace, EnvBuild, Environment, LearnOptions, LearnOutcome, Model, ModelInit, ModelLoad,
    ModelSpec, Obs, PolicyCtor, PolicyObject, Registries, Step, VecEnv,
};

const ALPHABET: [char; 4] = ['A', 'U', 'G', 'C'];

/// A terminal assignment of bases to target sites.
pub struct MatchSolution {
    pub target: String,
    pub designed: String,
    pub distance: i64,
}

impl Solution for MatchSolution {
    fn distance(&self) -> i64 {
        self.distance
    }

    fn summary(&self) -> Vec<String> {
        vec![
            format!("Target:   {}", self.target),
            format!("Designed: {}", self.designed),
            format!("Distance: {}", self.distance),
        ]
    }
}

/// Toy inverse-design environment: one action per target site, choosing a
/// base from a 4-way score vector. Paired sites want G/C, unpaired sites
/// want A/U; the episode distance is the number of violations.
pub struct SequenceMatchEnv {
    dataset: Arc<Dataset>,
    next_idx: usize,
    active: Sequence,
    pos: usize,
    designed: Vec<char>,
    violations: i64,
    meta_learning: bool,
    randomize: bool,
    prev: Option<SolutionHandle>,
    rng: StdRng,
}

impl SequenceMatchEnv {
    pub fn from_build(build: &EnvBuild) -> Self {
        let (seq_len, meta_learning, randomize, seed) = match &build.config {
            Some(config) => (
                config.environment.seq_len.max(4),
                config.environment.meta_learning,
                config.environment.randomize,
                config.main.seed,
            ),
            None => (12, true, true, 0),
        };
        let target = default_target(seq_len);
        SequenceMatchEnv {
            dataset: Arc::new(Dataset::single(target.clone())),
            next_idx: 0,
            active: Sequence::new(target, 0),
            pos: 0,
            designed: Vec::new(),
            violations: 0,
            meta_learning,
            randomize,
            prev: None,
            rng: StdRng::seed_from_u64(seed.wrapping_add(build.rank as u64)),
        }
    }

    fn advance(&mut self) {
        // An empty dataset keeps the current target
        let len = self.dataset.sequences.len();
        if len == 0 {
            return;
        }
        self.active = self.dataset.sequences[self.next_idx % len].clone();
        self.next_idx += 1;
    }

    fn site_obs(&self) -> Obs {
        match self.active.target.chars().nth(self.pos) {
            Some('(') => vec![1.0, 0.0, 0.0],
            Some(')') => vec![0.0, 1.0, 0.0],
            Some(_) => vec![0.0, 0.0, 1.0],
            None => vec![0.0, 0.0, 0.0],
        }
    }
}

fn default_target(seq_len: usize) -> String {
    let open = seq_len / 4;
    let mut s = String::with_capacity(seq_len);
    s.extend(std::iter::repeat('(').take(open));
    s.extend(std::iter::repeat('.').take(seq_len - 2 * open));
    s.extend(std::iter::repeat(')').take(open));
    s
}

impl Environment for SequenceMatchEnv {
    fn reset(&mut self) -> Obs {
        if self.randomize {
            if !self.dataset.sequences.is_empty() {
                let i = self.rng.random_range(0..self.dataset.sequences.len());
                self.active = self.dataset.sequences[i].clone();
            }
        } else if self.meta_learning {
            self.advance();
        }
        self.pos = 0;
        self.designed.clear();
        self.violations = 0;
        self.site_obs()
    }

    fn step(&mut self, action: &[f32]) -> Step {
        let base = action
            .iter()
            .take(ALPHABET.len())
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(i, _)| i);
        self.designed.push(ALPHABET[base]);

        let site = self.active.target.chars().nth(self.pos);
        let paired = matches!(site, Some('(') | Some(')'));
        let fits = if paired { base >= 2 } else { base < 2 };
        if !fits {
            self.violations += 1;
        }

        self.pos += 1;
        let done = self.pos >= self.active.target.len();
        if done {
            self.prev = Some(Arc::new(MatchSolution {
                target: self.active.target.clone(),
                designed: self.designed.iter().collect(),
                distance: self.violations,
            }));
        }
        Step {
            obs: self.site_obs(),
            reward: if done { -(self.violations as f32) } else { 0.0 },
            done,
        }
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace::new(ALPHABET.len(), -1.0, 1.0)
    }

    fn set_dataset(&mut self, dataset: Arc<Dataset>) -> Result<(), AttrError> {
        self.dataset = dataset;
        self.next_idx = 0;
        Ok(())
    }

    fn set_meta_learning(&mut self, on: bool) -> Result<(), AttrError> {
        self.meta_learning = on;
        Ok(())
    }

    fn set_randomize(&mut self, on: bool) -> Result<(), AttrError> {
        self.randomize = on;
        Ok(())
    }

    fn next_target(&mut self) -> Result<(), AttrError> {
        self.advance();
        Ok(())
    }

    fn prev_solution(&self) -> Result<SolutionHandle, AttrError> {
        self.prev
            .clone()
            .ok_or(AttrError::Unsupported("prev_solution"))
    }
}

/// Uniform-random baseline model. `learn` just burns through the step
/// budget so the surrounding train/checkpoint flow can be exercised.
pub struct RandomModel {
    space: ActionSpace,
    steps_done: u64,
    rng: StdRng,
}

impl RandomModel {
    pub fn new(space: ActionSpace) -> Self {
        RandomModel {
            space,
            steps_done: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Box<dyn Model>, String> {
        let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
        let mut parts = content.split_whitespace();
        let tag = parts.next().unwrap_or_default();
        if tag != "random" {
            return Err(format!("not a Random model file: {}", path.display()));
        }
        let dim: usize = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or("missing action dimension")?;
        let steps_done: u64 = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or("missing step count")?;
        Ok(Box::new(RandomModel {
            space: ActionSpace::new(dim, -1.0, 1.0),
            steps_done,
            rng: StdRng::from_os_rng(),
        }))
    }
}

impl Model for RandomModel {
    fn name(&self) -> &str {
        "Random"
    }

    fn predict(&mut self, obs: &[Obs], _deterministic: bool) -> Vec<Vec<f32>> {
        obs.iter().map(|_| self.space.sample(&mut self.rng)).collect()
    }

    fn learn(
        &mut self,
        env: &mut dyn VecEnv,
        opts: &LearnOptions,
        interrupt: &AtomicBool,
    ) -> Result<LearnOutcome, TransportError> {
        let n = env.n_workers();
        env.reset()?;
        let mut taken = 0u64;
        while taken < opts.total_timesteps {
            if interrupt.load(Ordering::Relaxed) {
                return Ok(LearnOutcome::Interrupted);
            }
            let obs = vec![Vec::new(); n];
            let actions = self.predict(&obs, false);
            env.step(&actions)?;
            taken += n as u64;
            self.steps_done += n as u64;
        }
        Ok(LearnOutcome::Completed)
    }

    fn save(&self, path: &Path) -> std::io::Result<()> {
        fs::write(path, format!("random {} {}\n", self.space.dim, self.steps_done))
    }
}

struct BasicPolicy {
    name: String,
}

impl PolicyObject for BasicPolicy {
    fn name(&self) -> &str {
        &self.name
    }
}

fn basic_policy(name: &'static str) -> PolicyCtor {
    Arc::new(move |_args| {
        Arc::new(BasicPolicy {
            name: name.to_string(),
        })
    })
}

/// Register the built-in backends on `registries`.
pub fn register_builtins(registries: &mut Registries) {
    for name in ["MlpPolicy", "MlpLstmPolicy", "CnnPolicy"] {
        registries.policies.register_builtin(name, basic_policy(name));
    }
    registries
        .policies
        .register_custom("CustomMlpPolicy", basic_policy("CustomMlpPolicy"));

    registries.models.register(
        "Random",
        ModelSpec {
            create: Arc::new(|init: ModelInit| {
                Ok(Box::new(RandomModel::new(init.action_space)) as Box<dyn Model>)
            }),
            load: Arc::new(|load: ModelLoad| RandomModel::load_from(&load.path)),
        },
    );

    registries.envs.register(
        "RnaMatch-v0",
        Arc::new(|build: EnvBuild| Box::new(SequenceMatchEnv::from_build(&build)) as _),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_build() -> EnvBuild {
        EnvBuild {
            name: "RnaMatch-v0".to_string(),
            config: None,
            seed: None,
            rank: 0,
        }
    }

    fn one_hot(base: usize) -> Vec<f32> {
        let mut a = vec![0.0; 4];
        a[base] = 1.0;
        a
    }

    #[test]
    fn test_perfect_episode_has_zero_distance() {
        let mut env = SequenceMatchEnv::from_build(&bare_build());
        env.set_randomize(false).unwrap();
        env.set_meta_learning(false).unwrap();
        let target: String = env.active.target.clone();
        env.reset();

        let mut last = None;
        for site in target.chars() {
            let base = if site == '.' { 0 } else { 2 };
            last = Some(env.step(&one_hot(base)));
        }
        assert!(last.unwrap().done);
        let solution = env.prev_solution().unwrap();
        assert_eq!(solution.distance(), 0);
    }

    #[test]
    fn test_wrong_bases_are_counted() {
        let mut env = SequenceMatchEnv::from_build(&bare_build());
        env.set_randomize(false).unwrap();
        env.set_meta_learning(false).unwrap();
        let len = env.active.target.len();
        env.reset();

        // G everywhere: every unpaired site is a violation
        let dots = env.active.target.chars().filter(|c| *c == '.').count();
        for _ in 0..len {
            env.step(&one_hot(2));
        }
        let solution = env.prev_solution().unwrap();
        assert_eq!(solution.distance(), dots as i64);
    }

    #[test]
    fn test_next_target_walks_the_dataset() {
        let mut env = SequenceMatchEnv::from_build(&bare_build());
        let dataset = Arc::new(Dataset {
            name: "two".to_string(),
            sequences: vec![Sequence::new("(.)", 0), Sequence::new("(..)", 1)],
        });
        env.set_dataset(dataset).unwrap();
        env.next_target().unwrap();
        assert_eq!(env.active.target, "(.)");
        env.next_target().unwrap();
        assert_eq!(env.active.target, "(..)");
        env.next_target().unwrap();
        assert_eq!(env.active.target, "(.)"); // wraps
    }

    #[test]
    fn test_empty_dataset_keeps_current_target() {
        let mut env = SequenceMatchEnv::from_build(&bare_build());
        let target = env.active.target.clone();
        env.set_dataset(Arc::new(Dataset {
            name: "empty".to_string(),
            sequences: Vec::new(),
        }))
        .unwrap();

        env.next_target().unwrap();
        assert_eq!(env.active.target, target);

        // Both reset branches tolerate the empty dataset
        env.set_randomize(true).unwrap();
        env.reset();
        assert_eq!(env.active.target, target);
        env.set_randomize(false).unwrap();
        env.set_meta_learning(true).unwrap();
        env.reset();
        assert_eq!(env.active.target, target);
    }

    #[test]
    fn test_prev_solution_before_any_episode() {
        let env = SequenceMatchEnv::from_build(&bare_build());
        assert!(env.prev_solution().is_err());
    }

    #[test]
    fn test_random_model_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let model = RandomModel::new(ActionSpace::new(4, -1.0, 1.0));
        model.save(&path).unwrap();

        let mut loaded = RandomModel::load_from(&path).unwrap();
        let actions = loaded.predict(&[vec![0.0; 3]], true);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].len(), 4);
    }

    #[test]
    fn test_random_model_learn_respects_interrupt() {
        let mut registries = Registries::new();
        register_builtins(&mut registries);
        let ctor = registries.envs.get("RnaMatch-v0").unwrap();
        let build = bare_build();
        let mut env = crate::rl::DummyVecEnv::new(vec![Box::new(move || ctor(build))]);

        let mut model = RandomModel::new(ActionSpace::new(4, -1.0, 1.0));
        let interrupt = AtomicBool::new(true);
        let opts = LearnOptions {
            total_timesteps: 1_000,
            tb_log_name: "t".to_string(),
            reset_num_timesteps: false,
            seed: 0,
        };
        let outcome = model.learn(&mut env, &opts, &interrupt).unwrap();
        assert_eq!(outcome, LearnOutcome::Interrupted);
        assert_eq!(model.steps_done, 0);
    }

    #[test]
    fn test_random_model_learn_spends_budget() {
        let mut registries = Registries::new();
        register_builtins(&mut registries);
        let ctor = registries.envs.get("RnaMatch-v0").unwrap();
        let build = bare_build();
        let mut env = crate::rl::DummyVecEnv::new(vec![Box::new(move || ctor(build))]);

        let mut model = RandomModel::new(ActionSpace::new(4, -1.0, 1.0));
        let interrupt = AtomicBool::new(false);
        let opts = LearnOptions {
            total_timesteps: 64,
            tb_log_name: "t".to_string(),
            reset_num_timesteps: false,
            seed: 0,
        };
        let outcome = model.learn(&mut env, &opts, &interrupt).unwrap();
        assert_eq!(outcome, LearnOutcome::Completed);
        assert_eq!(model.steps_done, 64);
    }
}

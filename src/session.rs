use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Local;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{resolve_config, ConfigOverrides, RunConfig};
use crate::data::{Dataset, ExpertData, SolutionHandle};
use crate::env::{classify, make_env_pair, EnvFamily};
use crate::error::{AttrError, SessionError, TransportError};
use crate::rl::{
    LearnOptions, LearnOutcome, Model, ModelInit, ModelLoad, Obs, OrnsteinUhlenbeckNoise,
    PolicyArgs, Registries, VecEnv,
};
use crate::run_dir::{self, RunSelector, MODEL_FILE};
use crate::settings::Settings;

/// Timestamp format used in run directory names and result logs.
pub const STAMP_FORMAT: &str = "%m-%d_%H-%M";

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Training,
    Interrupted,
}

/// Outcome of one solved sequence during batch evaluation.
#[derive(Clone)]
pub struct EvalRecord {
    pub index: usize,
    pub solution: SolutionHandle,
    /// 1-based episode count it took within the budget.
    pub iterations: usize,
    pub budget: usize,
}

/// Optional inputs to [`Session::create`].
#[derive(Default)]
pub struct CreateOptions {
    pub config_name: Option<String>,
    pub config_location: Option<PathBuf>,
    /// Required when the configured model is an imitation learner.
    pub expert_data: Option<ExpertData>,
}

/// A model bound to its train/test environments and run directory: the
/// orchestration unit driving training, testing and evaluation.
///
/// Control flow is strictly sequential; any real parallelism lives behind
/// the vectorized environment handles.
pub struct Session<'r> {
    registries: &'r Registries,
    settings: Settings,
    env_name: String,
    family: EnvFamily,
    config: RunConfig,
    env_path: PathBuf,
    run_path: PathBuf,
    run_name: String,
    env: Box<dyn VecEnv>,
    test_env: Box<dyn VecEnv>,
    model: Box<dyn Model>,
    imitation: bool,
    reloaded: bool,
    status: RunStatus,
    rng: StdRng,
}

fn is_custom(policy_name: &str) -> bool {
    policy_name.to_ascii_lowercase().contains("custom")
}

fn env_dir(settings: &Settings, family: EnvFamily, env_name: &str, subdir: &str) -> PathBuf {
    settings
        .trained_models
        .join(family.tag())
        .join(env_name)
        .join(subdir)
}

impl<'r> Session<'r> {
    /// Create a new model: resolve configuration, derive a fresh run
    /// directory, build environments, look up policy and model by name and
    /// construct the model.
    pub fn create(
        registries: &'r Registries,
        settings: Settings,
        env_name: &str,
        subdir: &str,
        options: CreateOptions,
    ) -> Result<Self, SessionError> {
        let family = classify(env_name, &registries.envs)?;
        let overrides = ConfigOverrides {
            config_location: options.config_location,
            config_name: options.config_name,
            model_dir: None,
        };
        let (mut config, _) = resolve_config(&settings, env_name, family, &overrides)?;

        let env_path = env_dir(&settings, family, env_name, subdir);
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let id = run_dir::next_run_id(&env_path);
        let run_name = run_dir::build_run_name(
            id,
            &config.main.model,
            config.main.n_workers,
            config.environment.seq_len,
            config.environment.seq_count,
            &stamp,
        );
        let run_path = env_path.join(&run_name);
        config.environment.path = Some(run_path.clone());

        let (env, test_env) = make_env_pair(&registries.envs, env_name, family, &config)?;

        println!("Creating {} model...", config.main.model);
        let (policy, policy_ctor) = registries.policies.get(&config.main.policy)?;
        let custom_policy = is_custom(&policy.name);
        let policy_args = if custom_policy {
            PolicyArgs::Nested(config.policy_params())
        } else {
            PolicyArgs::Flat(config.policy_params())
        };
        let policy_object = policy_ctor(&policy_args);

        let model_name = config.main.model.to_ascii_lowercase();
        let spec = registries.models.get(&config.main.model)?;

        let action_noise = if model_name.contains("ddpg") {
            Some(OrnsteinUhlenbeckNoise::new(env.action_space().dim, 0.5))
        } else {
            None
        };

        let imitation = custom_policy && model_name.contains("gail");
        let expert_data: Option<ExpertData> = if imitation {
            Some(options.expert_data.ok_or_else(|| {
                SessionError::Model(format!(
                    "model '{}' requires an expert dataset",
                    config.main.model
                ))
            })?)
        } else {
            None
        };

        // Imitation learners are constructed against the expert dataset and
        // the single-worker test handle; everything else binds the train
        // handle's shape.
        let (action_space, n_envs) = if imitation {
            (test_env.action_space(), test_env.n_workers())
        } else {
            (env.action_space(), env.n_workers())
        };

        let init = ModelInit {
            policy,
            policy_object,
            policy_args,
            params: config.model_params(),
            action_space,
            n_envs,
            action_noise,
            expert_data,
            tensorboard_log: env_path.clone(),
        };
        let model = (spec.create)(init).map_err(SessionError::Model)?;

        let seed = config.main.seed;
        Ok(Session {
            registries,
            settings,
            env_name: env_name.to_string(),
            family,
            config,
            env_path,
            run_path,
            run_name,
            env,
            test_env,
            model,
            imitation,
            reloaded: false,
            status: RunStatus::Idle,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Reload a saved model from an existing run directory, rebuilding the
    /// environments from its persisted configuration.
    pub fn reload(
        registries: &'r Registries,
        settings: Settings,
        env_name: &str,
        subdir: &str,
        selector: &RunSelector,
        config_name: Option<String>,
    ) -> Result<Self, SessionError> {
        let family = classify(env_name, &registries.envs)?;
        let env_path = env_dir(&settings, family, env_name, subdir);
        let run_path = run_dir::locate_run(&env_path, selector)?;
        println!("Model path: {}", run_path.display());

        let overrides = ConfigOverrides {
            config_location: None,
            config_name,
            model_dir: Some(run_path.clone()),
        };
        let (mut config, _) = resolve_config(&settings, env_name, family, &overrides)?;
        config.environment.path = Some(run_path.clone());

        let run_name = run_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!("Unique: {run_name}");

        let (env, test_env) = make_env_pair(&registries.envs, env_name, family, &config)?;

        let spec = registries.models.get(&config.main.model)?;
        let model_file = run_path.join(MODEL_FILE);
        println!("Loading file {}", model_file.display());
        let model = (spec.load)(ModelLoad {
            path: model_file,
            tensorboard_log: env_path.clone(),
        })
        .map_err(SessionError::Model)?;

        let imitation = is_custom(&config.main.policy)
            && config.main.model.to_ascii_lowercase().contains("gail");
        let seed = config.main.seed;
        Ok(Session {
            registries,
            settings,
            env_name: env_name.to_string(),
            family,
            config,
            env_path,
            run_path,
            run_name,
            env,
            test_env,
            model,
            imitation,
            reloaded: true,
            status: RunStatus::Idle,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn run_path(&self) -> &PathBuf {
        &self.run_path
    }

    pub fn env_path(&self) -> &PathBuf {
        &self.env_path
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Run the training loop. A raised `interrupt` flag stops training
    /// early; a checkpoint save is attempted on both the completed and the
    /// interrupted path before control returns.
    pub fn train(&mut self, steps: Option<u64>, interrupt: &AtomicBool) -> Result<(), SessionError> {
        if !self.reloaded {
            fs::create_dir_all(&self.run_path)?;
        }
        self.check_env_status()?;
        self.status = RunStatus::Training;

        let opts = LearnOptions {
            total_timesteps: steps.unwrap_or(self.config.main.n_steps),
            tb_log_name: self
                .run_name
                .strip_suffix("_1")
                .unwrap_or(&self.run_name)
                .to_string(),
            reset_num_timesteps: false,
            seed: self.config.main.seed,
        };

        let env = if self.imitation {
            &mut self.test_env
        } else {
            &mut self.env
        };
        let outcome = self.model.learn(env.as_mut(), &opts, interrupt);
        self.reloaded = true;

        match outcome {
            Ok(LearnOutcome::Completed) => {
                self.save()?;
                self.status = RunStatus::Idle;
                Ok(())
            }
            Ok(LearnOutcome::Interrupted) => {
                println!("Stopped training...");
                self.save()?;
                self.status = RunStatus::Interrupted;
                Ok(())
            }
            Err(e) => {
                self.status = RunStatus::Idle;
                Err(e.into())
            }
        }
    }

    /// Persist the model and its resolved configuration into the run
    /// directory. The fill-rate log only exists for the binpacking family;
    /// its absence elsewhere is reported and ignored.
    pub fn save(&mut self) -> Result<(), SessionError> {
        fs::create_dir_all(&self.run_path)?;
        self.model.save(&self.run_path.join(MODEL_FILE))?;
        self.config.save(&self.run_path)?;
        if self.family == EnvFamily::Binpacking {
            self.save_fill_log()?;
        }
        Ok(())
    }

    /// Write the per-worker fill-rate logs next to the checkpoint.
    pub fn save_fill_log(&mut self) -> Result<(), SessionError> {
        match self.env.fill_log() {
            Ok(logs) => {
                let mut f = fs::File::create(self.run_path.join("fill_log.log"))?;
                for log in logs {
                    for value in log {
                        writeln!(f, "{value}")?;
                    }
                }
                Ok(())
            }
            Err(AttrError::Unsupported(_)) => {
                println!("Attribute does not exist.");
                Ok(())
            }
            Err(AttrError::Transport(e)) => Err(e.into()),
        }
    }

    /// Probe the train environment and rebuild both handles if its worker
    /// transport has failed. The transport error never escapes this method.
    pub fn check_env_status(&mut self) -> Result<(), SessionError> {
        match self.env.reset() {
            Ok(_) => Ok(()),
            Err(TransportError::ChannelClosed) => {
                println!("Pipe, Recreating environment");
                self.recreate_envs()
            }
            Err(TransportError::UnexpectedEof) => {
                println!("EOF, Recreating environment");
                self.recreate_envs()
            }
        }
    }

    fn recreate_envs(&mut self) -> Result<(), SessionError> {
        let (env, test_env) =
            make_env_pair(&self.registries.envs, &self.env_name, self.family, &self.config)?;
        // The model is rebound implicitly: every later call drives the new
        // handles.
        self.env = env;
        self.test_env = test_env;
        Ok(())
    }

    /// Small rendering test loop against the test environment.
    pub fn run_test(
        &mut self,
        steps: usize,
        deterministic: bool,
        render: bool,
    ) -> Result<(), SessionError> {
        self.check_env_status()?;
        let mut obs = self.test_env.reset()?;
        for i in 0..steps {
            let actions = self.model.predict(&obs, deterministic);
            let results = self.test_env.step(&actions)?;
            if render {
                let mean: f32 =
                    actions[0].iter().sum::<f32>() / actions[0].len().max(1) as f32;
                println!(
                    "step {i:4} | action mean: {mean:+.3} | reward: {:+.3} | done: {}",
                    results[0].reward, results[0].done
                );
            }
            obs = results.into_iter().map(|s| s.obs).collect();
        }
        Ok(())
    }

    /// One full episode on the test handle; returns the terminal solution.
    /// Relies on the handle auto-resetting finished workers.
    fn play_episode(
        &mut self,
        obs: &mut Vec<Obs>,
        random: bool,
    ) -> Result<SolutionHandle, SessionError> {
        let space = self.test_env.action_space();
        loop {
            let actions: Vec<Vec<f32>> = if random {
                obs.iter().map(|_| space.sample(&mut self.rng)).collect()
            } else {
                self.model.predict(obs, false)
            };
            let steps = self.test_env.step(&actions)?;
            let done = steps[0].done;
            *obs = steps.into_iter().map(|s| s.obs).collect();
            if done {
                return Ok(self.test_env.prev_solution()?);
            }
        }
    }

    /// Repeated rollouts against a fixed target: generate candidate
    /// solutions for `target` until the budget is spent.
    pub fn inverse_design(
        &mut self,
        target: &str,
        budget: usize,
    ) -> Result<Vec<SolutionHandle>, SessionError> {
        self.test_env.set_dataset(Arc::new(Dataset::single(target)))?;
        self.test_env.next_target()?;
        self.test_env.set_meta_learning(false)?;
        let mut obs = self.test_env.reset()?;

        let mut solutions = Vec::with_capacity(budget);
        for _ in 0..budget {
            let solution = self.play_episode(&mut obs, false)?;
            for line in solution.summary() {
                println!("{line}");
            }
            solutions.push(solution);
        }
        Ok(solutions)
    }

    /// Random-action baseline over a fixed target.
    pub fn random_rollouts(
        &mut self,
        target: &str,
        budget: usize,
    ) -> Result<Vec<SolutionHandle>, SessionError> {
        self.test_env.set_dataset(Arc::new(Dataset::single(target)))?;
        self.test_env.next_target()?;
        self.test_env.set_meta_learning(false)?;
        let mut obs = self.test_env.reset()?;

        let mut solutions = Vec::with_capacity(budget);
        for _ in 0..budget {
            let solution = self.play_episode(&mut obs, true)?;
            for line in solution.summary() {
                println!("{line}");
            }
            solutions.push(solution);
        }
        Ok(solutions)
    }

    /// Batch evaluation over a labeled dataset. A sequence is solved when a
    /// terminal solution reaches distance <= 0; its remaining budget is not
    /// consumed. Results are written to the result log and returned.
    pub fn evaluate_dataset(
        &mut self,
        dataset_name: &str,
        start: usize,
        n_seqs: usize,
        budget: usize,
    ) -> Result<Vec<EvalRecord>, SessionError> {
        let dataset = Dataset::load(&self.settings.data, dataset_name, start, n_seqs)?;
        let total = dataset.len();
        self.test_env.set_dataset(Arc::new(dataset.clone()))?;
        self.test_env.set_randomize(false)?;
        self.test_env.set_meta_learning(false)?;

        let mut records = Vec::new();
        for index in 0..total {
            self.test_env.next_target()?;
            let mut obs = self.test_env.reset()?;
            for b in 0..budget {
                let solution = self.play_episode(&mut obs, false)?;
                if solution.distance() <= 0 {
                    for line in solution.summary() {
                        println!("{line}");
                    }
                    println!("Solved sequence: {index} in {}/{budget} iterations...", b + 1);
                    records.push(EvalRecord {
                        index,
                        solution,
                        iterations: b + 1,
                        budget,
                    });
                    break;
                }
            }
        }
        println!("Solved {}/{total}", records.len());

        self.write_results(&records, &dataset, budget)?;
        Ok(records)
    }

    /// Write one evaluation batch to
    /// `<results>/<dataset>/<stamp>_<solved>.log`.
    pub fn write_results(
        &self,
        records: &[EvalRecord],
        dataset: &Dataset,
        budget: usize,
    ) -> Result<PathBuf, SessionError> {
        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let dir = self.settings.results.join(&dataset.name);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{stamp}_{}.log", records.len()));

        let mut f = fs::File::create(&path)?;
        writeln!(
            f,
            "Dataset: {}, date: {}, solved {}/{} sequences with {} eval budget.",
            dataset.name,
            stamp,
            records.len(),
            dataset.len(),
            budget
        )?;
        writeln!(f, "{}", "=".repeat(100))?;
        for record in records {
            for line in record.solution.summary() {
                writeln!(f, "{line}")?;
            }
            writeln!(f, "Solved in: {}/{}", record.iterations, budget)?;
        }
        Ok(path)
    }

    /// Remove incomplete sibling runs of this session's environment.
    pub fn prune_incomplete(&self) -> Result<usize, SessionError> {
        run_dir::prune_incomplete(&self.env_path).map_err(Into::into)
    }
}

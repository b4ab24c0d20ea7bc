use std::sync::Arc;

use crate::config::RunConfig;
use crate::env::EnvFamily;
use crate::error::EnvError;
use crate::rl::{DummyVecEnv, EnvBuild, EnvCtor, EnvRegistry, FrameStack, VecEnv, WorkerVecEnv};

/// Build a vectorized environment for `env_name`.
///
/// The per-worker construction style depends on the family: sequence
/// environments share the run configuration, generic ones get a seed salted
/// with their worker rank, robotic ones are constructed from the name alone.
/// More than one worker means thread-backed parallel workers; exactly one
/// means a single in-process environment. A requested frame-stack depth > 0
/// wraps the result.
pub fn make_vec_env(
    envs: &EnvRegistry,
    env_name: &str,
    family: EnvFamily,
    config: &RunConfig,
    n_workers: usize,
) -> Result<Box<dyn VecEnv>, EnvError> {
    let ctor = envs
        .get(env_name)
        .ok_or_else(|| EnvError::NotRegistered(env_name.to_string()))?;

    let shared = Arc::new(config.clone());
    let ctors: Vec<EnvCtor> = (0..n_workers)
        .map(|rank| {
            let build = match family {
                EnvFamily::Sequence => EnvBuild {
                    name: env_name.to_string(),
                    config: Some(shared.clone()),
                    seed: None,
                    rank,
                },
                EnvFamily::Generic => EnvBuild {
                    name: env_name.to_string(),
                    config: None,
                    seed: Some(config.main.seed + rank as u64),
                    rank,
                },
                EnvFamily::Robotics => EnvBuild {
                    name: env_name.to_string(),
                    config: None,
                    seed: None,
                    rank,
                },
                EnvFamily::Binpacking | EnvFamily::Physics => {
                    return Err(EnvError::UnsupportedFamily(family.tag()))
                }
            };
            let ctor = ctor.clone();
            Ok(Box::new(move || ctor(build)) as EnvCtor)
        })
        .collect::<Result<_, EnvError>>()?;

    let vectorized: Box<dyn VecEnv> = if n_workers > 1 {
        Box::new(WorkerVecEnv::new(ctors).map_err(EnvError::Transport)?)
    } else {
        Box::new(DummyVecEnv::new(ctors))
    };

    let vectorized = if config.main.frame_stack > 0 {
        Box::new(FrameStack::new(vectorized, config.main.frame_stack))
    } else {
        vectorized
    };

    Ok(vectorized)
}

/// Build the train/test environment pair for a run: the train handle with
/// `main.n_workers` workers, and a test handle from a deep copy of the
/// configuration with the worker count forced to 1 and meta-learning forced
/// off.
pub fn make_env_pair(
    envs: &EnvRegistry,
    env_name: &str,
    family: EnvFamily,
    config: &RunConfig,
) -> Result<(Box<dyn VecEnv>, Box<dyn VecEnv>), EnvError> {
    println!("Creating {env_name} Environment...");
    let train = make_vec_env(envs, env_name, family, config, config.main.n_workers)?;

    let mut test_config = config.clone();
    test_config.environment.meta_learning = false;
    test_config.main.n_workers = 1;
    let test = make_vec_env(envs, env_name, family, &test_config, 1)?;

    Ok((train, test))
}

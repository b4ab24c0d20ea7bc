use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use foldrl::data::ExpertData;
use foldrl::env::classify;
use foldrl::monitor::TensorboardMonitor;
use foldrl::rl::builtin::register_builtins;
use foldrl::rl::Registries;
use foldrl::run_dir::{self, RunSelector};
use foldrl::session::{CreateOptions, Session};
use foldrl::settings::Settings;

/// Train, test and evaluate inverse-design models.
#[derive(Parser)]
#[command(name = "foldrl", about = "Train and evaluate inverse sequence design models")]
struct Cli {
    /// Environment name, e.g. RnaMatch-v0
    #[arg(long, default_value = "RnaMatch-v0")]
    env: String,

    /// Subdirectory under the environment's run root
    #[arg(long, default_value = "")]
    subdir: String,

    /// Use <config_dir>/<NAME>.yml instead of the per-environment default
    #[arg(long)]
    config_name: Option<String>,

    /// Use this exact config file, overriding every other candidate
    #[arg(long)]
    config_location: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a fresh model, or continue a reloaded run
    Train {
        /// Run to continue: a numeric id, an exact name, or "latest"
        #[arg(long)]
        reload: Option<String>,

        /// Override the configured step budget
        #[arg(long)]
        steps: Option<u64>,

        /// Expert trajectory file for imitation-learning models
        #[arg(long)]
        expert_data: Option<PathBuf>,

        /// Serve a TensorBoard dashboard for the run root while training
        #[arg(long)]
        tensorboard: bool,
    },
    /// Step a reloaded model through its test environment
    Test {
        /// Run to load: a numeric id, an exact name, or "latest"
        run: String,

        #[arg(long, default_value_t = 1000)]
        steps: usize,

        #[arg(long)]
        deterministic: bool,
    },
    /// Batch-evaluate a reloaded model over a dataset
    Evaluate {
        run: String,

        /// Dataset name under the data root (without .txt)
        #[arg(long)]
        dataset: String,

        /// 1-based line to start from
        #[arg(long, default_value_t = 1)]
        start: usize,

        #[arg(long, default_value_t = 100)]
        n_seqs: usize,

        /// Episodes allowed per sequence
        #[arg(long, default_value_t = 20)]
        budget: usize,
    },
    /// Generate candidate designs for a single target structure
    Inverse {
        run: String,
        target: String,

        #[arg(long, default_value_t = 10)]
        budget: usize,
    },
    /// Random-action baseline over a single target structure
    Random {
        run: String,
        target: String,

        #[arg(long, default_value_t = 10)]
        budget: usize,
    },
    /// Delete incomplete run directories of the environment
    Prune,
}

fn parse_selector(run: &str) -> RunSelector {
    if run.eq_ignore_ascii_case("latest") {
        RunSelector::Latest
    } else if let Ok(id) = run.parse() {
        RunSelector::Id(id)
    } else {
        RunSelector::Name(run.to_string())
    }
}

/// Raise the flag when a line starting with 'q' arrives on stdin.
fn spawn_interrupt_listener() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let listener_flag = flag.clone();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim_start().starts_with('q') => {
                    listener_flag.store(true, Ordering::Relaxed);
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    flag
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::default();
    let mut registries = Registries::new();
    register_builtins(&mut registries);

    match cli.command {
        Command::Train {
            reload,
            steps,
            expert_data,
            tensorboard,
        } => {
            let mut session = match reload {
                Some(run) => Session::reload(
                    &registries,
                    settings,
                    &cli.env,
                    &cli.subdir,
                    &parse_selector(&run),
                    cli.config_name,
                )
                .with_context(|| format!("reloading run '{run}'"))?,
                None => Session::create(
                    &registries,
                    settings,
                    &cli.env,
                    &cli.subdir,
                    CreateOptions {
                        config_name: cli.config_name,
                        config_location: cli.config_location,
                        expert_data: expert_data.map(ExpertData::new),
                    },
                )
                .context("creating model")?,
            };

            let mut monitor = TensorboardMonitor::default();
            if tensorboard {
                monitor
                    .launch(session.env_path())
                    .context("launching TensorBoard")?;
                let _ = monitor.open_browser();
            }

            println!("Training {} (type 'q' + Enter to stop and save)", session.run_name());
            let interrupt = spawn_interrupt_listener();
            session.train(steps, &interrupt).context("training")?;
            println!("Saved run {}", session.run_path().display());
        }
        Command::Test {
            run,
            steps,
            deterministic,
        } => {
            let mut session = Session::reload(
                &registries,
                settings,
                &cli.env,
                &cli.subdir,
                &parse_selector(&run),
                cli.config_name,
            )
            .with_context(|| format!("reloading run '{run}'"))?;
            session
                .run_test(steps, deterministic, true)
                .context("running test loop")?;
        }
        Command::Evaluate {
            run,
            dataset,
            start,
            n_seqs,
            budget,
        } => {
            let mut session = Session::reload(
                &registries,
                settings,
                &cli.env,
                &cli.subdir,
                &parse_selector(&run),
                cli.config_name,
            )
            .with_context(|| format!("reloading run '{run}'"))?;
            let records = session
                .evaluate_dataset(&dataset, start, n_seqs, budget)
                .with_context(|| format!("evaluating dataset '{dataset}'"))?;
            println!("Wrote {} result entries", records.len());
        }
        Command::Inverse {
            run,
            target,
            budget,
        } => {
            let mut session = Session::reload(
                &registries,
                settings,
                &cli.env,
                &cli.subdir,
                &parse_selector(&run),
                cli.config_name,
            )
            .with_context(|| format!("reloading run '{run}'"))?;
            session
                .inverse_design(&target, budget)
                .context("inverse design")?;
        }
        Command::Random {
            run,
            target,
            budget,
        } => {
            let mut session = Session::reload(
                &registries,
                settings,
                &cli.env,
                &cli.subdir,
                &parse_selector(&run),
                cli.config_name,
            )
            .with_context(|| format!("reloading run '{run}'"))?;
            session
                .random_rollouts(&target, budget)
                .context("random baseline")?;
        }
        Command::Prune => {
            let family = classify(&cli.env, &registries.envs)?;
            let env_dir = settings
                .trained_models
                .join(family.tag())
                .join(&cli.env)
                .join(&cli.subdir);
            run_dir::prune_incomplete(&env_dir)
                .with_context(|| format!("pruning {}", env_dir.display()))?;
        }
    }

    Ok(())
}

//! # foldrl
//!
//! Orchestration layer for reinforcement-learning-driven inverse sequence
//! design: it resolves run configuration, builds vectorized environments,
//! constructs or reloads models through name-keyed registries, and drives
//! the training, testing and batch-evaluation loops.
//!
//! ## Modules
//!
//! - [`session`] — Model/environment lifecycle: create, reload, train, evaluate
//! - [`config`] — YAML run configuration and the priority resolution chain
//! - [`env`] — Environment family classification and the vectorized factory
//! - [`rl`] — Environment/model traits, registries, workers, exploration noise
//! - [`run_dir`] — Run directory naming, lookup and pruning
//! - [`data`] — Design targets, datasets, candidate solutions
//! - [`monitor`] — TensorBoard process management
//! - [`settings`] — Filesystem roots
//! - [`error`] — Structured error types

pub mod config;
pub mod data;
pub mod env;
pub mod error;
pub mod monitor;
pub mod rl;
pub mod run_dir;
pub mod session;
pub mod settings;

//! Environment classification and vectorized environment construction.

mod classify;
mod factory;

pub use classify::{classify, EnvFamily};
pub use factory::{make_env_pair, make_vec_env};

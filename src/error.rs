use std::path::PathBuf;

/// Errors that can occur while resolving or loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config file found for '{env_name}' (tried the override, model-dir, env-name and family-fallback candidates)")]
    NotFound { env_name: String },

    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("main.policy names unknown policy block '{0}'")]
    UnknownPolicy(String),

    #[error("main.model names unknown model block '{0}'")]
    UnknownModel(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Name lookups against the policy/model registries.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("policy '{0}' not found in the builtin or custom policy registries")]
    Policy(String),

    #[error("model '{0}' not found in the model registry")]
    Model(String),
}

/// Errors from environment classification and construction.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("environment '{0}' matches no known family and is not registered")]
    Classification(String),

    #[error("no constructor style for environment family '{0}'")]
    UnsupportedFamily(&'static str),

    #[error("environment '{0}' is not registered")]
    NotRegistered(String),

    #[error("transport failure during environment construction: {0}")]
    Transport(TransportError),
}

/// Errors locating runs in the per-environment checkpoint directory.
#[derive(Debug, thiserror::Error)]
pub enum RunDirError {
    #[error("environment directory {0} does not exist")]
    EnvDirMissing(PathBuf),

    #[error("no run directory matches '{0}'")]
    NoMatch(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the worker request/response channel. Recovered locally by
/// recreating the environment; never surfaced through the session API.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("worker channel closed")]
    ChannelClosed,

    #[error("unexpected end of stream from worker")]
    UnexpectedEof,
}

/// Attribute access on environments that may not support the attribute.
#[derive(Debug, thiserror::Error)]
pub enum AttrError {
    #[error("environment attribute '{0}' is not supported")]
    Unsupported(&'static str),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Top-level error for session (create/reload/train/eval) operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("environment error: {0}")]
    Env(#[from] EnvError),

    #[error("run directory error: {0}")]
    RunDir(#[from] RunDirError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("attribute error: {0}")]
    Attr(#[from] AttrError),

    #[error("model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_error_display() {
        let err = LookupError::Policy("MlpPolicy".to_string());
        assert_eq!(
            err.to_string(),
            "policy 'MlpPolicy' not found in the builtin or custom policy registries"
        );
    }

    #[test]
    fn test_env_error_display() {
        let err = EnvError::Classification("NoSuchEnv-v0".to_string());
        assert_eq!(
            err.to_string(),
            "environment 'NoSuchEnv-v0' matches no known family and is not registered"
        );
    }

    #[test]
    fn test_attr_error_wraps_transport() {
        let err = AttrError::from(TransportError::ChannelClosed);
        assert_eq!(err.to_string(), "worker channel closed");
    }
}

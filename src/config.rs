use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::env::EnvFamily;
use crate::error::ConfigError;
use crate::settings::Settings;

/// File name under which a run's resolved configuration is persisted.
pub const CONFIG_FILE: &str = "config.yml";

/// A named bag of hyperparameters, forwarded verbatim to policy/model
/// constructors.
pub type Params = BTreeMap<String, serde_yaml::Value>;

/// Run-level scalars from the `main` group.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MainConfig {
    pub n_workers: usize,
    pub n_steps: u64,
    pub seed: u64,
    #[serde(default)]
    pub frame_stack: usize,
    pub model: String,
    pub policy: String,
    #[serde(flatten)]
    pub extra: Params,
}

/// Environment-specific scalars from the `environment` group.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub seq_len: usize,
    pub seq_count: usize,
    pub dataset: Option<String>,
    pub meta_learning: bool,
    pub randomize: bool,
    /// Resolved run directory; filled in when a model is created or reloaded.
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: Params,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        EnvironmentConfig {
            seq_len: 0,
            seq_count: 0,
            dataset: None,
            meta_learning: true,
            randomize: true,
            path: None,
            extra: Params::new(),
        }
    }
}

/// The full configuration of a run, loadable from YAML.
///
/// `policy` and `model` start out empty in the file and are filled by
/// [`RunConfig::resolve_selected`] with copies of the blocks that
/// `main.policy` / `main.model` name.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunConfig {
    pub main: MainConfig,
    pub policies: BTreeMap<String, Params>,
    pub models: BTreeMap<String, Params>,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<Params>,
}

impl RunConfig {
    /// Parse a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: RunConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Copy the selected policy and model parameter blocks into the top-level
    /// `policy`/`model` keys. Safe to call repeatedly on the same structure.
    pub fn resolve_selected(&mut self) -> Result<(), ConfigError> {
        let policy = self
            .policies
            .get(&self.main.policy)
            .ok_or_else(|| ConfigError::UnknownPolicy(self.main.policy.clone()))?;
        let model = self
            .models
            .get(&self.main.model)
            .ok_or_else(|| ConfigError::UnknownModel(self.main.model.clone()))?;
        self.policy = Some(policy.clone());
        self.model = Some(model.clone());
        Ok(())
    }

    /// The resolved policy parameter block. Empty if
    /// [`RunConfig::resolve_selected`] has not run.
    pub fn policy_params(&self) -> Params {
        self.policy.clone().unwrap_or_default()
    }

    /// The resolved model parameter block.
    pub fn model_params(&self) -> Params {
        self.model.clone().unwrap_or_default()
    }

    /// Persist the configuration as `config.yml` inside `dir`.
    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(dir.join(CONFIG_FILE), yaml)?;
        Ok(())
    }
}

/// Explicit overrides for [`resolve_config`], first match winning.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// (1) Use this exact file.
    pub config_location: Option<PathBuf>,
    /// (2) Use `<config_dir>/<name>.yml`.
    pub config_name: Option<String>,
    /// (3) Use `<model_dir>/config.yml` (reload path).
    pub model_dir: Option<PathBuf>,
}

/// Pick the config file governing a run, by priority:
///
/// 1. an explicit `config_location` path
/// 2. `<config_dir>/<config_name>.yml`
/// 3. `<model_dir>/config.yml`
/// 4. `<config_dir>/<env_name>.yml`, if present
/// 5. `<config_dir>/<family_tag>.yml`, if present
///
/// Returns the loaded config (with `policy`/`model` resolved) and the path it
/// came from.
pub fn resolve_config(
    settings: &Settings,
    env_name: &str,
    family: EnvFamily,
    overrides: &ConfigOverrides,
) -> Result<(RunConfig, PathBuf), ConfigError> {
    let path = if let Some(location) = &overrides.config_location {
        location.clone()
    } else if let Some(name) = &overrides.config_name {
        settings.config_dir.join(format!("{name}.yml"))
    } else if let Some(model_dir) = &overrides.model_dir {
        model_dir.join(CONFIG_FILE)
    } else {
        let by_env = settings.config_dir.join(format!("{env_name}.yml"));
        let by_family = settings.config_dir.join(format!("{}.yml", family.tag()));
        if by_env.is_file() {
            by_env
        } else if by_family.is_file() {
            by_family
        } else {
            return Err(ConfigError::NotFound {
                env_name: env_name.to_string(),
            });
        }
    };

    let mut config = RunConfig::load(&path)?;
    config.resolve_selected()?;
    println!("Loaded config file from: {}", path.display());
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
main:
  n_workers: 4
  n_steps: 1000
  seed: 7
  model: Ppo
  policy: MlpPolicy
policies:
  MlpPolicy:
    layers: [64, 64]
models:
  Ppo:
    learning_rate: 0.0003
    gamma: 0.99
environment:
  seq_len: 32
  seq_count: 100
"#;

    fn write_config(path: &Path, marker: &str) {
        let yaml = MINIMAL.replace("seed: 7", &format!("seed: {marker}"));
        fs::write(path, yaml).unwrap();
    }

    fn test_settings(root: &Path) -> Settings {
        let s = Settings::rooted_at(root);
        fs::create_dir_all(&s.config_dir).unwrap();
        s
    }

    #[test]
    fn test_parse_and_resolve_selected() {
        let mut config: RunConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert!(config.policy.is_none());
        config.resolve_selected().unwrap();
        let model = config.model.as_ref().unwrap();
        assert!(model.contains_key("learning_rate"));
        let policy = config.policy.as_ref().unwrap();
        assert!(policy.contains_key("layers"));
    }

    #[test]
    fn test_resolve_selected_is_idempotent() {
        let mut config: RunConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.resolve_selected().unwrap();
        let first = config.clone();
        config.resolve_selected().unwrap();
        assert_eq!(
            serde_yaml::to_string(&first).unwrap(),
            serde_yaml::to_string(&config).unwrap()
        );
    }

    #[test]
    fn test_resolve_selected_unknown_policy() {
        let mut config: RunConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.main.policy = "Missing".to_string();
        assert!(matches!(
            config.resolve_selected(),
            Err(ConfigError::UnknownPolicy(_))
        ));
    }

    #[test]
    fn test_priority_chain_falls_through_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());

        let named = settings.config_dir.join("special.yml");
        let model_dir = dir.path().join("run");
        fs::create_dir_all(&model_dir).unwrap();
        let from_model = model_dir.join(CONFIG_FILE);
        let by_env = settings.config_dir.join("RnaDesign-v0.yml");
        let by_family = settings.config_dir.join("sequence.yml");

        write_config(&named, "2");
        write_config(&from_model, "3");
        write_config(&by_env, "4");
        write_config(&by_family, "5");

        let overrides = ConfigOverrides {
            config_name: Some("special".to_string()),
            model_dir: Some(model_dir.clone()),
            ..Default::default()
        };
        let (c, _) = resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides)
            .unwrap();
        assert_eq!(c.main.seed, 2);

        let overrides = ConfigOverrides {
            model_dir: Some(model_dir),
            ..Default::default()
        };
        let (c, _) = resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides)
            .unwrap();
        assert_eq!(c.main.seed, 3);

        let overrides = ConfigOverrides::default();
        let (c, _) = resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides)
            .unwrap();
        assert_eq!(c.main.seed, 4);

        fs::remove_file(&by_env).unwrap();
        let (c, _) = resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides)
            .unwrap();
        assert_eq!(c.main.seed, 5);

        fs::remove_file(&by_family).unwrap();
        let err = resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_explicit_location_wins() {
        let dir = tempfile::tempdir().unwrap();
        let settings = test_settings(dir.path());
        write_config(&settings.config_dir.join("RnaDesign-v0.yml"), "4");
        let explicit = dir.path().join("elsewhere.yml");
        write_config(&explicit, "1");

        let overrides = ConfigOverrides {
            config_location: Some(explicit),
            config_name: Some("special".to_string()),
            ..Default::default()
        };
        let (c, _) = resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides)
            .unwrap();
        assert_eq!(c.main.seed, 1);
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config: RunConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.resolve_selected().unwrap();
        config.environment.path = Some(dir.path().to_path_buf());
        config.save(dir.path()).unwrap();

        let settings = Settings::rooted_at(dir.path());
        let overrides = ConfigOverrides {
            model_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (reloaded, _) =
            resolve_config(&settings, "RnaDesign-v0", EnvFamily::Sequence, &overrides).unwrap();

        assert_eq!(reloaded.main.n_workers, config.main.n_workers);
        assert_eq!(reloaded.main.model, config.main.model);
        assert_eq!(reloaded.environment.seq_len, config.environment.seq_len);
        assert_eq!(reloaded.policy, config.policy);
        assert_eq!(reloaded.model, config.model);
    }

    #[test]
    fn test_unknown_keys_roundtrip_through_flatten() {
        let yaml = MINIMAL.replace(
            "environment:",
            "environment:\n  custom_knob: 3.5",
        );
        let config: RunConfig = serde_yaml::from_str(&yaml).unwrap();
        assert!(config.environment.extra.contains_key("custom_knob"));
        let out = serde_yaml::to_string(&config).unwrap();
        assert!(out.contains("custom_knob"));
    }
}

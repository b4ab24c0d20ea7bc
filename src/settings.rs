use std::path::{Path, PathBuf};

/// Filesystem roots used by the orchestration layer. Constructed explicitly
/// and passed to whoever needs it; there is no ambient global settings state.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the YAML config files.
    pub config_dir: PathBuf,
    /// Root under which per-environment run directories are created.
    pub trained_models: PathBuf,
    /// Root for evaluation result logs.
    pub results: PathBuf,
    /// Root for sequence dataset files.
    pub data: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config_dir: PathBuf::from("config"),
            trained_models: PathBuf::from("trained_models"),
            results: PathBuf::from("results"),
            data: PathBuf::from("data"),
        }
    }
}

impl Settings {
    /// All four roots as subdirectories of `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Settings {
            config_dir: root.join("config"),
            trained_models: root.join("trained_models"),
            results: root.join("results"),
            data: root.join("data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooted_at_builds_subdirs() {
        let s = Settings::rooted_at(Path::new("/tmp/ws"));
        assert_eq!(s.config_dir, PathBuf::from("/tmp/ws/config"));
        assert_eq!(s.trained_models, PathBuf::from("/tmp/ws/trained_models"));
        assert_eq!(s.results, PathBuf::from("/tmp/ws/results"));
        assert_eq!(s.data, PathBuf::from("/tmp/ws/data"));
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::RunDirError;

/// Serialized model file marking a run directory as complete.
pub const MODEL_FILE: &str = "model.bin";

/// Parse the leading integer of a run directory name, up to the first
/// underscore. Malformed names yield `None` and are skipped by the callers.
pub fn parse_run_id(name: &str) -> Option<u64> {
    let head = name.split('_').next()?;
    head.parse().ok()
}

/// The next run id for `env_dir`: one past the highest leading integer among
/// existing subdirectory names, or `0` when the directory is empty, missing,
/// or holds no parsable names. Ids are recomputed from directory names each
/// time, so gaps left by deletions are skipped but never reused.
pub fn next_run_id(env_dir: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(env_dir) else {
        return 0;
    };
    entries
        .flatten()
        .filter_map(|e| parse_run_id(&e.file_name().to_string_lossy()))
        .max()
        .map_or(0, |max| max + 1)
}

/// Compose a run directory name from its identity parts:
/// `"{id}_{model}_{workers}_SL{seq_len}_SC{seq_count}_{stamp}_1"`.
pub fn build_run_name(
    id: u64,
    model: &str,
    n_workers: usize,
    seq_len: usize,
    seq_count: usize,
    stamp: &str,
) -> String {
    format!("{id}_{model}_{n_workers}_SL{seq_len}_SC{seq_count}_{stamp}_1")
}

/// Remove every subdirectory of `env_dir` that lacks a serialized model file.
/// Returns how many were removed. Idempotent.
pub fn prune_incomplete(env_dir: &Path) -> Result<usize, RunDirError> {
    let mut removed = 0;
    for entry in fs::read_dir(env_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        if !path.join(MODEL_FILE).is_file() {
            fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    println!(
        "Cleaned directory {} and removed {} folders.",
        env_dir.display(),
        removed
    );
    Ok(removed)
}

/// How to pick an existing run directory for reload.
#[derive(Debug, Clone)]
pub enum RunSelector {
    /// Leading numeric id. If several directories share the id, the first
    /// match in directory-listing order wins; the listing order itself is
    /// platform-defined.
    Id(u64),
    /// Most recently modified run directory.
    Latest,
    /// Exact directory name.
    Name(String),
}

impl std::fmt::Display for RunSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunSelector::Id(id) => write!(f, "id {id}"),
            RunSelector::Latest => write!(f, "latest"),
            RunSelector::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Locate an existing run directory under `env_dir`.
pub fn locate_run(env_dir: &Path, selector: &RunSelector) -> Result<PathBuf, RunDirError> {
    if !env_dir.is_dir() {
        return Err(RunDirError::EnvDirMissing(env_dir.to_path_buf()));
    }

    let dirs: Vec<PathBuf> = fs::read_dir(env_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    let found = match selector {
        RunSelector::Id(id) => dirs.into_iter().find(|p| {
            p.file_name()
                .map(|n| parse_run_id(&n.to_string_lossy()) == Some(*id))
                .unwrap_or(false)
        }),
        RunSelector::Latest => dirs.into_iter().max_by_key(|p| {
            p.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH)
        }),
        RunSelector::Name(name) => dirs
            .into_iter()
            .find(|p| p.file_name().map(|n| n.to_string_lossy() == *name).unwrap_or(false)),
    };

    found.ok_or_else(|| RunDirError::NoMatch(selector.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_id() {
        assert_eq!(parse_run_id("3_Ppo_4_SL32_SC100_08-31_12-00_1"), Some(3));
        assert_eq!(parse_run_id("17_x"), Some(17));
        assert_eq!(parse_run_id("notanumber_x"), None);
        assert_eq!(parse_run_id(""), None);
        assert_eq!(parse_run_id("42"), Some(42));
    }

    #[test]
    fn test_next_run_id_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_run_id(dir.path()), 0);
        assert_eq!(next_run_id(&dir.path().join("does_not_exist")), 0);
    }

    #[test]
    fn test_next_run_id_takes_max_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("3_x")).unwrap();
        fs::create_dir(dir.path().join("7_y")).unwrap();
        assert_eq!(next_run_id(dir.path()), 8);
    }

    #[test]
    fn test_next_run_id_skips_unparsable_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("3_x")).unwrap();
        fs::create_dir(dir.path().join("junk")).unwrap();
        fs::create_dir(dir.path().join("also_junk_5")).unwrap();
        assert_eq!(next_run_id(dir.path()), 4);
    }

    #[test]
    fn test_build_run_name() {
        assert_eq!(
            build_run_name(5, "Ppo", 4, 32, 100, "08-31_12-00"),
            "5_Ppo_4_SL32_SC100_08-31_12-00_1"
        );
    }

    #[test]
    fn test_prune_incomplete_removes_only_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let complete = dir.path().join("0_done");
        let incomplete = dir.path().join("1_broken");
        fs::create_dir(&complete).unwrap();
        fs::write(complete.join(MODEL_FILE), b"weights").unwrap();
        fs::create_dir(&incomplete).unwrap();
        fs::write(incomplete.join("other.txt"), b"x").unwrap();

        assert_eq!(prune_incomplete(dir.path()).unwrap(), 1);
        assert!(complete.exists());
        assert!(!incomplete.exists());

        // Second run removes nothing
        assert_eq!(prune_incomplete(dir.path()).unwrap(), 0);
        assert!(complete.exists());
    }

    #[test]
    fn test_locate_run_by_id_and_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("2_a")).unwrap();
        fs::create_dir(dir.path().join("5_b")).unwrap();

        let found = locate_run(dir.path(), &RunSelector::Id(5)).unwrap();
        assert_eq!(found.file_name().unwrap(), "5_b");

        let found = locate_run(dir.path(), &RunSelector::Name("2_a".to_string())).unwrap();
        assert_eq!(found.file_name().unwrap(), "2_a");

        let err = locate_run(dir.path(), &RunSelector::Id(9)).unwrap_err();
        assert!(matches!(err, RunDirError::NoMatch(_)));
    }

    #[test]
    fn test_locate_run_missing_env_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_run(&dir.path().join("missing"), &RunSelector::Latest).unwrap_err();
        assert!(matches!(err, RunDirError::EnvDirMissing(_)));
    }

    #[test]
    fn test_locate_run_latest_by_mtime() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("0_old")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        fs::create_dir(dir.path().join("1_new")).unwrap();

        let found = locate_run(dir.path(), &RunSelector::Latest).unwrap();
        assert_eq!(found.file_name().unwrap(), "1_new");
    }
}

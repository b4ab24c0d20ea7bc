use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A single design target: a secondary-structure string in dot-bracket
/// notation plus its position in the source dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub target: String,
    pub index: usize,
}

impl Sequence {
    pub fn new(target: impl Into<String>, index: usize) -> Self {
        Sequence {
            target: target.into(),
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// An ordered collection of design targets, loaded from a plain-text file
/// with one dot-bracket string per line.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub sequences: Vec<Sequence>,
}

impl Dataset {
    /// A one-off dataset holding a single target, used by the inverse-design
    /// and random-baseline loops.
    pub fn single(target: impl Into<String>) -> Self {
        Dataset {
            name: "single".to_string(),
            sequences: vec![Sequence::new(target, 0)],
        }
    }

    /// Load `n_seqs` targets from `<data_root>/<name>.txt`, starting at the
    /// 1-based line `start`. Blank lines are skipped.
    pub fn load(
        data_root: &Path,
        name: &str,
        start: usize,
        n_seqs: usize,
    ) -> std::io::Result<Self> {
        let path = data_root.join(format!("{name}.txt"));
        let content = fs::read_to_string(&path)?;
        let sequences = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .skip(start.saturating_sub(1))
            .take(n_seqs)
            .enumerate()
            .map(|(i, l)| Sequence::new(l.trim(), i))
            .collect();
        Ok(Dataset {
            name: name.to_string(),
            sequences,
        })
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// A terminal candidate solution produced by an environment episode.
///
/// `distance()` is the structural distance to the target; a sequence counts
/// as solved when it reaches zero (or below, for backends that report signed
/// slack). `summary()` renders the human-readable block written to result
/// logs.
pub trait Solution: Send + Sync {
    fn distance(&self) -> i64;
    fn summary(&self) -> Vec<String>;
}

pub type SolutionHandle = Arc<dyn Solution>;

/// Pointer to a recorded expert-trajectory dataset consumed by
/// imitation-learning model constructors. The file format is the model
/// backend's business.
#[derive(Debug, Clone)]
pub struct ExpertData {
    pub path: PathBuf,
    /// Cap on the number of trajectories to use; `None` means all.
    pub traj_limit: Option<usize>,
}

impl ExpertData {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ExpertData {
            path: path.into(),
            traj_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_single_dataset() {
        let d = Dataset::single("((..))");
        assert_eq!(d.len(), 1);
        assert_eq!(d.sequences[0].target, "((..))");
        assert_eq!(d.sequences[0].index, 0);
    }

    #[test]
    fn test_load_with_start_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.txt");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "(...)").unwrap();
        writeln!(f, "((.))").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "(....)").unwrap();
        writeln!(f, "((..))").unwrap();

        let d = Dataset::load(dir.path(), "targets", 2, 2).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.sequences[0].target, "((.))");
        assert_eq!(d.sequences[1].target, "(....)");
        // Indices are renumbered relative to the slice
        assert_eq!(d.sequences[0].index, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Dataset::load(dir.path(), "nope", 1, 10).is_err());
    }
}

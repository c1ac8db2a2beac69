//! detectors/walk.rs
//!
//! Deterministic enumeration of Python files under a root.

use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct FileFilter {
    /// Directory names pruned anywhere below the root.
    pub exclude_dirs: Vec<String>,
    /// File-name globs never scanned.
    pub exclude_patterns: Vec<String>,
    /// File-name globs identifying test modules.
    pub test_file_patterns: Vec<String>,
    /// Absolute subtrees pruned from the walk (e.g. a test root nested in the library).
    pub exclude_roots: Vec<PathBuf>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            exclude_dirs: [
                "build",
                "dist",
                "__pycache__",
                "venv",
                ".venv",
                "env",
                ".env",
                "site-packages",
                ".git",
                ".tox",
                ".pytest_cache",
            ]
            .map(String::from)
            .to_vec(),
            exclude_patterns: vec!["setup.py".into(), "conftest.py".into()],
            test_file_patterns: vec!["test_*.py".into(), "*_test.py".into()],
            exclude_roots: Vec::new(),
        }
    }
}

impl FileFilter {
    pub fn is_test_file(&self, path: &Path) -> bool {
        matches_any(&self.test_file_patterns, path)
    }

    fn is_excluded_file(&self, path: &Path) -> bool {
        matches_any(&self.exclude_patterns, path)
    }
}

fn matches_any(patterns: &[String], path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    patterns.iter().any(|p| match Pattern::new(p) {
        Ok(pat) => pat.matches(name),
        Err(_) => p == name,
    })
}

/// All `.py` files under `root`, sorted by path.
pub fn python_files(root: &Path, filter: &FileFilter) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            if filter.exclude_roots.iter().any(|r| e.path() == r) {
                return false;
            }
            !(e.file_type().is_dir()
                && e.file_name()
                    .to_str()
                    .map(|n| filter.exclude_dirs.iter().any(|d| d == n))
                    .unwrap_or(false))
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("py"))
        .filter(|p| !filter.is_excluded_file(p))
        .collect();

    files.sort();
    files
}

//! Run configuration, read from `stubsmith.toml`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::detectors::FileFilter;
use crate::driver::{FallbackPolicy, MAX_ATTEMPTS};
use crate::error::SetupError;

pub const CONFIG_FILE: &str = "stubsmith.toml";

/// Missing fields take their defaults, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub max_attempts: u32,
    pub fallback: FallbackPolicy,
    /// Pass earlier failures back to the Implementer.
    pub feedback: bool,
    /// Wall-clock bound on one pytest invocation.
    pub test_timeout_secs: u64,
    /// Captured stdout/stderr beyond this many bytes is dropped.
    pub output_limit_bytes: usize,
    pub pytest_command: Vec<String>,
    pub exclude_dirs: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub test_file_patterns: Vec<String>,
    /// Function names never treated as stubs.
    pub skip_functions: Vec<String>,
    /// Characters of the containing file shown to the Implementer.
    pub context_limit_chars: usize,
    pub implementer: ImplementerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImplementerKind {
    #[default]
    OpenAI,
    Anthropic,
    Command,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImplementerConfig {
    pub kind: ImplementerKind,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// argv for `kind = "command"`.
    pub command: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let filter = FileFilter::default();
        Self {
            max_attempts: MAX_ATTEMPTS,
            fallback: FallbackPolicy::FullSuite,
            feedback: true,
            test_timeout_secs: 600,
            output_limit_bytes: 100_000,
            pytest_command: vec!["python".into(), "-m".into(), "pytest".into()],
            exclude_dirs: filter.exclude_dirs,
            exclude_patterns: filter.exclude_patterns,
            test_file_patterns: filter.test_file_patterns,
            skip_functions: Vec::new(),
            context_limit_chars: 12_000,
            implementer: ImplementerConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), SetupError> {
        let invalid = |m: &str| Err(SetupError::Invalid(m.to_string()));

        if self.max_attempts == 0 {
            return invalid("max_attempts must be >= 1");
        }
        if self.test_timeout_secs == 0 {
            return invalid("test_timeout_secs must be > 0");
        }
        if self.output_limit_bytes == 0 {
            return invalid("output_limit_bytes must be > 0");
        }
        if self.pytest_command.first().map_or(true, |p| p.trim().is_empty()) {
            return invalid("pytest_command must be a non-empty array");
        }
        if self.test_file_patterns.is_empty() {
            return invalid("test_file_patterns must not be empty");
        }
        if let Some(bad) = self
            .exclude_patterns
            .iter()
            .chain(&self.test_file_patterns)
            .find(|p| glob::Pattern::new(p).is_err())
        {
            return Err(SetupError::Invalid(format!("bad file pattern {bad:?}")));
        }
        if self.implementer.kind == ImplementerKind::Command
            && self.implementer.command.first().map_or(true, |p| p.trim().is_empty())
        {
            return invalid("implementer.command is required when kind = \"command\"");
        }
        if self.implementer.timeout_secs == Some(0) {
            return invalid("implementer.timeout_secs must be > 0");
        }
        Ok(())
    }

    pub fn file_filter(&self) -> FileFilter {
        FileFilter {
            exclude_dirs: self.exclude_dirs.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            test_file_patterns: self.test_file_patterns.clone(),
            exclude_roots: Vec::new(),
        }
    }
}

/// Loads and validates a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, SetupError> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }

    let contents = fs::read_to_string(path).map_err(|e| SetupError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let cfg: Config = toml::from_str(&contents).map_err(|e| SetupError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.max_attempts, 3);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);
        fs::write(
            &path,
            "fallback = \"same-module\"\nfeedback = false\n\n[implementer]\nkind = \"command\"\ncommand = [\"./impl.sh\"]\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.fallback, FallbackPolicy::SameModule);
        assert!(!cfg.feedback);
        assert_eq!(cfg.implementer.kind, ImplementerKind::Command);
        assert_eq!(cfg.test_timeout_secs, 600);
        assert_eq!(cfg.pytest_command, vec!["python", "-m", "pytest"]);
    }

    #[test]
    fn rejects_invalid_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(CONFIG_FILE);

        fs::write(&path, "max_attempts = 0\n").expect("write");
        assert!(matches!(load_config(&path), Err(SetupError::Invalid(_))));

        fs::write(&path, "[implementer]\nkind = \"command\"\n").expect("write");
        assert!(matches!(load_config(&path), Err(SetupError::Invalid(_))));

        fs::write(&path, "max_attempts = \"three\"\n").expect("write");
        assert!(matches!(load_config(&path), Err(SetupError::Config { .. })));
    }
}

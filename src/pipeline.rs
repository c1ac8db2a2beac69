//! pipeline.rs
//!
//! Setup and the end-to-end run: resolve roots, scan once, drive every
//! target, then run the whole suite for the final report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::catalog::{build_catalog, Catalog, CatalogOptions, SymbolIndex};
use crate::config::{Config, ImplementerKind};
use crate::detectors::{discover_targets, TargetOptions};
use crate::driver::{Driver, DriverOptions};
use crate::error::{ScanError, SetupError};
use crate::llm::prompt::PromptLimits;
use crate::llm::{CommandImplementer, HttpImplementer, Implementer, Provider, ProviderConfig};
use crate::report::RunReport;
use crate::runner::{PytestRunner, SuiteRunner};
use crate::state::{ImplementationTarget, SuiteResult};

const DEFAULT_IMPLEMENTER_TIMEOUT_SECS: u64 = 300;

/// Canonical, existing directories the run works in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roots {
    pub library: PathBuf,
    pub tests: PathBuf,
    /// pytest rootdir; test ids are relative to it.
    pub project: PathBuf,
}

impl Roots {
    pub fn resolve(library: &Path, tests: &Path, project: Option<&Path>) -> Result<Self, SetupError> {
        let library = existing_dir("library", library)?;
        let tests = existing_dir("tests", tests)?;
        let project = match project {
            Some(p) => existing_dir("project", p)?,
            None => common_ancestor(&library, &tests),
        };

        Ok(Self {
            library,
            tests,
            project,
        })
    }
}

fn existing_dir(label: &'static str, path: &Path) -> Result<PathBuf, SetupError> {
    if !path.is_dir() {
        return Err(SetupError::MissingRoot {
            label,
            path: path.to_path_buf(),
        });
    }
    path.canonicalize().map_err(|source| SetupError::Canonicalize {
        path: path.to_path_buf(),
        source,
    })
}

fn common_ancestor(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.as_os_str())
        .collect()
}

/// The static inputs of a run.
#[derive(Debug)]
pub struct Workspace {
    pub roots: Roots,
    pub targets: Vec<ImplementationTarget>,
    pub catalog: Catalog,
    pub target_warnings: Vec<ScanError>,
}

/// Discovers targets, then catalogs tests against them.
pub fn scan(roots: Roots, cfg: &Config) -> Workspace {
    let mut filter = cfg.file_filter();
    if roots.tests != roots.library && roots.tests.starts_with(&roots.library) {
        filter.exclude_roots.push(roots.tests.clone());
    }

    let found = discover_targets(
        &roots.library,
        &TargetOptions {
            filter,
            skip_functions: cfg.skip_functions.clone(),
        },
    );
    tracing::info!(
        targets = found.items.len(),
        skipped_files = found.warnings.len(),
        "targets discovered"
    );

    let index = SymbolIndex::from_targets(&found.items);
    let catalog = build_catalog(
        &roots.tests,
        &roots.project,
        &index,
        &CatalogOptions {
            filter: cfg.file_filter(),
            ..CatalogOptions::default()
        },
    );
    tracing::info!(
        tests = catalog.len(),
        unassociated = catalog.unassociated(),
        skipped_files = catalog.warnings.len(),
        "test catalog built"
    );

    Workspace {
        roots,
        targets: found.items,
        catalog,
        target_warnings: found.warnings,
    }
}

/// Drives every target and runs the full suite once at the end.
pub fn execute(
    ws: Workspace,
    cfg: &Config,
    implementer: &dyn Implementer,
    runner: &dyn SuiteRunner,
) -> RunReport {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, implementer = implementer.name(), "run started");

    let driver = Driver::new(
        implementer,
        runner,
        DriverOptions {
            max_attempts: cfg.max_attempts,
            fallback: cfg.fallback,
            feedback: cfg.feedback,
        },
    );
    let targets = driver.run(ws.targets, &ws.catalog);

    let suite = if ws.catalog.is_empty() {
        SuiteResult::default()
    } else {
        tracing::info!(tests = ws.catalog.len(), "running full suite");
        runner.run_all(&ws.catalog)
    };

    let warnings = ws
        .target_warnings
        .iter()
        .chain(&ws.catalog.warnings)
        .map(|w| w.to_string())
        .collect();

    RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        library_root: ws.roots.library,
        test_root: ws.roots.tests,
        project_root: ws.roots.project,
        catalog_size: ws.catalog.len(),
        unassociated_tests: ws.catalog.unassociated(),
        targets,
        suite,
        warnings,
    }
}

/* ============================================================
   Collaborators from config
   ============================================================ */

pub fn build_implementer(cfg: &Config, project_root: &Path) -> Result<Box<dyn Implementer>, SetupError> {
    let ic = &cfg.implementer;
    let limits = PromptLimits {
        file_context_chars: cfg.context_limit_chars,
        ..PromptLimits::default()
    };
    let timeout = Duration::from_secs(ic.timeout_secs.unwrap_or(DEFAULT_IMPLEMENTER_TIMEOUT_SECS));

    let provider = match ic.kind {
        ImplementerKind::Command => {
            let implementer = CommandImplementer::new(&ic.command, limits, timeout)
                .map_err(|e| SetupError::Invalid(e.to_string()))?
                .current_dir(project_root.to_path_buf());
            return Ok(Box::new(implementer));
        }
        ImplementerKind::OpenAI => Provider::OpenAI,
        ImplementerKind::Anthropic => Provider::Anthropic,
    };

    let provider_cfg = ProviderConfig::resolve(
        provider,
        ic.model.clone(),
        ic.api_key.clone(),
        ic.base_url.clone(),
    );
    let implementer =
        HttpImplementer::new(provider_cfg, limits, timeout).map_err(|e| SetupError::Invalid(e.to_string()))?;
    if !implementer.is_configured() {
        // Not fatal: every attempt fails as unavailable and targets are exhausted.
        tracing::warn!(provider = ?provider, "no API key configured");
    }
    Ok(Box::new(implementer))
}

pub fn build_runner(cfg: &Config, project_root: &Path) -> PytestRunner {
    PytestRunner::new(
        cfg.pytest_command.clone(),
        project_root.to_path_buf(),
        Duration::from_secs(cfg.test_timeout_secs),
        cfg.output_limit_bytes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn project_root_defaults_to_common_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/pkg")).unwrap();
        fs::create_dir_all(dir.path().join("tests/unit")).unwrap();

        let roots = Roots::resolve(
            &dir.path().join("src/pkg"),
            &dir.path().join("tests/unit"),
            None,
        )
        .unwrap();

        assert_eq!(roots.project, dir.path().canonicalize().unwrap());
        assert!(roots.library.ends_with("src/pkg"));
    }

    #[test]
    fn missing_root_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Roots::resolve(&dir.path().join("nope"), dir.path(), None).unwrap_err();
        assert!(matches!(err, SetupError::MissingRoot { label: "library", .. }));
    }

    #[test]
    fn command_implementer_needs_argv() {
        let mut cfg = Config::default();
        cfg.implementer.kind = ImplementerKind::Command;
        assert!(build_implementer(&cfg, Path::new(".")).is_err());

        cfg.implementer.command = vec!["cat".into()];
        let implementer = build_implementer(&cfg, Path::new(".")).unwrap();
        assert_eq!(implementer.name(), "cat");
    }
}

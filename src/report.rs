//! report.rs
//!
//! End-of-run output: console summary, `--list` listing, and the optional
//! JSON and Markdown reports.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::driver::{Scope, TargetReport};
use crate::state::{AttemptOutcome, CaseOutcome, CaseResult, ImplementationTarget, SuiteResult, TargetStatus};

/// Everything one run produced.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub library_root: PathBuf,
    pub test_root: PathBuf,
    pub project_root: PathBuf,
    pub catalog_size: usize,
    pub unassociated_tests: usize,
    pub targets: Vec<TargetReport>,
    pub suite: SuiteResult,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn count(&self, status: TargetStatus) -> usize {
        self.targets.iter().filter(|t| t.status() == status).count()
    }
}

/* ============================================================
   Console
   ============================================================ */

pub fn print_summary(report: &RunReport, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Targets ({})", report.targets.len())?;
    let width = report
        .targets
        .iter()
        .map(|t| t.target.qualified_name.len())
        .max()
        .unwrap_or(0);

    for t in &report.targets {
        let n = t.attempts.len();
        writeln!(
            out,
            "  {:<9}  {:<width$}  {} attempt{}",
            t.status().to_string(),
            t.target.qualified_name,
            n,
            if n == 1 { "" } else { "s" },
        )?;
    }
    writeln!(
        out,
        "  {} accepted, {} exhausted",
        report.count(TargetStatus::Accepted),
        report.count(TargetStatus::Exhausted)
    )?;

    writeln!(out)?;
    write_suite_line(report, out)?;

    let failing = report.suite.failing();
    if !failing.is_empty() {
        writeln!(out, "Failing:")?;
        for id in failing {
            writeln!(out, "  {id}")?;
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out, "\nWarnings ({}):", report.warnings.len())?;
        for w in &report.warnings {
            writeln!(out, "  {w}")?;
        }
    }

    Ok(())
}

fn write_suite_line(report: &RunReport, out: &mut impl Write) -> io::Result<()> {
    let s = &report.suite;
    write!(
        out,
        "Full suite: {} passed, {} failed, {} errors",
        s.count(CaseOutcome::Pass),
        s.count(CaseOutcome::Fail),
        s.count(CaseOutcome::Error)
    )?;
    match s.infrastructure_error() {
        Some(e) => writeln!(out, " ({e})"),
        None => writeln!(out),
    }
}

/// `--list`: what would be processed, without touching anything.
pub fn print_listing(
    targets: &[ImplementationTarget],
    catalog: &Catalog,
    out: &mut impl Write,
) -> io::Result<()> {
    writeln!(out, "Targets ({})", targets.len())?;
    for t in targets {
        writeln!(
            out,
            "  {}  {}:{}  [{}]",
            t.qualified_name,
            t.file.display(),
            t.lines.start,
            t.shape.describe()
        )?;
    }

    writeln!(
        out,
        "\nTests ({}, {} unassociated)",
        catalog.len(),
        catalog.unassociated()
    )?;
    for c in &catalog.cases {
        match &c.target {
            Some(target) => writeln!(out, "  {}  -> {}", c.id, target)?,
            None => writeln!(out, "  {}", c.id)?,
        }
    }

    if !catalog.warnings.is_empty() {
        writeln!(out, "\nWarnings ({}):", catalog.warnings.len())?;
        for w in &catalog.warnings {
            writeln!(out, "  {w}")?;
        }
    }
    Ok(())
}

/* ============================================================
   JSON
   ============================================================ */

#[derive(Serialize)]
struct JsonReport<'a> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    library_root: &'a Path,
    test_root: &'a Path,
    project_root: &'a Path,
    catalog_size: usize,
    unassociated_tests: usize,
    targets: Vec<JsonTarget<'a>>,
    suite: JsonSuite<'a>,
    warnings: &'a [String],
}

#[derive(Serialize)]
struct JsonTarget<'a> {
    qualified_name: &'a str,
    file: &'a Path,
    line: usize,
    status: TargetStatus,
    scope: Scope,
    selected_tests: usize,
    attempts: Vec<JsonAttempt<'a>>,
}

#[derive(Serialize)]
struct JsonAttempt<'a> {
    attempt: u32,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    candidate: Option<&'a str>,
    failing_tests: &'a [String],
}

#[derive(Serialize)]
struct JsonSuite<'a> {
    passed: usize,
    failed: usize,
    errors: usize,
    infrastructure_error: Option<String>,
    cases: &'a std::collections::BTreeMap<String, CaseResult>,
}

pub fn write_json(report: &RunReport, path: &Path) -> io::Result<()> {
    let doc = JsonReport {
        run_id: report.run_id,
        started_at: report.started_at,
        finished_at: report.finished_at,
        library_root: &report.library_root,
        test_root: &report.test_root,
        project_root: &report.project_root,
        catalog_size: report.catalog_size,
        unassociated_tests: report.unassociated_tests,
        targets: report.targets.iter().map(json_target).collect(),
        suite: JsonSuite {
            passed: report.suite.count(CaseOutcome::Pass),
            failed: report.suite.count(CaseOutcome::Fail),
            errors: report.suite.count(CaseOutcome::Error),
            infrastructure_error: report.suite.infrastructure_error().map(|e| e.to_string()),
            cases: report.suite.cases(),
        },
        warnings: &report.warnings,
    };

    ensure_parent_dir(path)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &doc).map_err(io::Error::other)
}

fn json_target(t: &TargetReport) -> JsonTarget<'_> {
    JsonTarget {
        qualified_name: &t.target.qualified_name,
        file: &t.target.file,
        line: t.target.lines.start,
        status: t.status(),
        scope: t.scope,
        selected_tests: t.selected,
        attempts: t
            .attempts
            .iter()
            .map(|a| {
                let err = match &a.outcome {
                    AttemptOutcome::Error(e) => Some(e),
                    _ => None,
                };
                JsonAttempt {
                    attempt: a.attempt,
                    outcome: a.outcome.label(),
                    error_kind: err.map(|e| e.kind()),
                    error: err.map(|e| e.to_string()),
                    candidate: a.candidate.as_deref(),
                    failing_tests: &a.failing_tests,
                }
            })
            .collect(),
    }
}

/* ============================================================
   Markdown
   ============================================================ */

pub fn write_markdown(report: &RunReport, path: &Path) -> io::Result<()> {
    ensure_parent_dir(path)?;
    let mut out = File::create(path)?;

    writeln!(out, "# Stubsmith Report\n")?;
    writeln!(out, "- Run: `{}`", report.run_id)?;
    writeln!(out, "- Started: {}", report.started_at.to_rfc3339())?;
    writeln!(out, "- Library: `{}`", report.library_root.display())?;
    writeln!(out, "- Tests: `{}`\n", report.test_root.display())?;

    writeln!(out, "## Targets\n")?;
    writeln!(out, "| Target | Status | Attempts | Tests |")?;
    writeln!(out, "|---|---|---|---|")?;
    for t in &report.targets {
        writeln!(
            out,
            "| `{}` | {} | {} | {} ({:?}) |",
            t.target.qualified_name,
            t.status(),
            t.attempts.len(),
            t.selected,
            t.scope
        )?;
    }
    writeln!(out)?;

    for t in &report.targets {
        writeln!(out, "### `{}`\n", t.target.qualified_name)?;
        writeln!(out, "{}:{}\n", t.target.file.display(), t.target.lines.start)?;

        for a in &t.attempts {
            write!(out, "- attempt {}: {}", a.attempt, a.outcome.label())?;
            if let AttemptOutcome::Error(e) = &a.outcome {
                write!(out, " ({e})")?;
            }
            if !a.failing_tests.is_empty() {
                write!(out, ", failing: {}", a.failing_tests.join(", "))?;
            }
            writeln!(out)?;
        }

        if let Some(body) = &t.accepted_body {
            writeln!(out, "\n```diff")?;
            write!(out, "{}", pretty_diff(&t.target.stub_text, body))?;
            writeln!(out, "```")?;
        }
        writeln!(out)?;
    }

    let s = &report.suite;
    writeln!(out, "## Full Suite\n")?;
    writeln!(
        out,
        "- Passed: {}\n- Failed: {}\n- Errors: {}\n",
        s.count(CaseOutcome::Pass),
        s.count(CaseOutcome::Fail),
        s.count(CaseOutcome::Error)
    )?;
    if let Some(e) = s.infrastructure_error() {
        writeln!(out, "Runner error: {e}\n")?;
    }
    for (id, c) in s.cases().iter().filter(|(_, c)| c.outcome != CaseOutcome::Pass) {
        match &c.message {
            Some(m) => writeln!(out, "- `{id}`: {m}")?,
            None => writeln!(out, "- `{id}`")?,
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out, "\n## Warnings\n")?;
        for w in &report.warnings {
            writeln!(out, "- {w}")?;
        }
    }

    Ok(())
}

/// Line diff with `-`/`+`/` ` prefixes; always ends in a newline.
pub fn pretty_diff(before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut out = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(change.value());
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => fs::create_dir_all(p),
        _ => Ok(()),
    }
}

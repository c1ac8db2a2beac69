//! runner/pytest.rs
//!
//! Runs pytest on a set of node ids and turns its verbose output into a
//! `SuiteResult`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use regex::Regex;

use crate::catalog::Catalog;
use crate::error::TestExecutionError;
use crate::process::{run_with_timeout, Capture};
use crate::runner::SuiteRunner;
use crate::state::{CaseOutcome, CaseResult, SuiteResult, TestCase};

/// pytest exit codes that mean the run itself broke.
const INTERNAL_ERROR: i32 = 3;
const USAGE_ERROR: i32 = 4;

const NOT_REPORTED: &str = "not reported by pytest";

pub struct PytestRunner {
    command: Vec<String>,
    project_root: PathBuf,
    timeout: Duration,
    output_limit: usize,
}

impl PytestRunner {
    pub fn new(command: Vec<String>, project_root: PathBuf, timeout: Duration, output_limit: usize) -> Self {
        Self {
            command,
            project_root,
            timeout,
            output_limit,
        }
    }

    fn invoke<'a>(&self, targets: &[&str], expected: impl IntoIterator<Item = &'a str>) -> SuiteResult {
        let Some((program, base_args)) = self.command.split_first() else {
            return SuiteResult::infrastructure_failure(
                expected,
                TestExecutionError::Spawn("empty pytest command".into()),
            );
        };

        let mut cmd = Command::new(program);
        cmd.args(base_args)
            .args(["-v", "-rfE", "--tb=short", "-p", "no:cacheprovider"])
            // One broken test file must not stop the others from running.
            .arg("--continue-on-collection-errors")
            .arg("--rootdir")
            .arg(&self.project_root)
            .args(targets)
            .current_dir(&self.project_root);

        let capture = Capture::keeping(self.output_limit, is_report_line);
        let out = match run_with_timeout(cmd, None, self.timeout, capture) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(program = %program, err = %e, "cannot launch pytest");
                return SuiteResult::infrastructure_failure(
                    expected,
                    TestExecutionError::Spawn(format!("{program}: {e}")),
                );
            }
        };

        if out.timed_out {
            return SuiteResult::infrastructure_failure(
                expected,
                TestExecutionError::Timeout(self.timeout.as_secs()),
            );
        }

        if let Some(code @ (INTERNAL_ERROR | USAGE_ERROR)) = out.code() {
            return SuiteResult::infrastructure_failure(
                expected,
                TestExecutionError::Runner {
                    code,
                    detail: tail(&out.combined(), 20),
                },
            );
        }

        if out.truncated {
            tracing::debug!(limit = self.output_limit, "pytest output trimmed to report lines");
        }

        let report = parse_output(&out.combined());
        tracing::debug!(
            exit = ?out.code(),
            reported = report.cases.len(),
            duration_ms = out.duration_ms as u64,
            "pytest finished"
        );

        SuiteResult::new(report.resolve(expected))
    }
}

impl SuiteRunner for PytestRunner {
    fn run(&self, cases: &[&TestCase]) -> SuiteResult {
        if cases.is_empty() {
            return SuiteResult::default();
        }

        let ids: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        self.invoke(&ids, ids.iter().copied())
    }

    fn run_all(&self, catalog: &Catalog) -> SuiteResult {
        if catalog.is_empty() {
            return SuiteResult::default();
        }

        let root = relative_to(&catalog.root, &self.project_root);
        let ids = catalog.cases.iter().map(|c| c.id.as_str());
        self.invoke(&[root.as_str()], ids)
    }
}

/* ============================================================
   Output parsing
   ============================================================ */

#[derive(Debug, Default)]
struct Report {
    cases: BTreeMap<String, CaseResult>,
    /// Collection errors keyed by test file.
    file_errors: BTreeMap<String, String>,
}

impl Report {
    fn record(&mut self, id: &str, outcome: CaseOutcome) {
        let id = base_id(id);
        let entry = self.cases.entry(id.to_string()).or_insert(CaseResult {
            outcome,
            message: None,
        });
        entry.outcome = entry.outcome.max(outcome);
    }

    fn annotate(&mut self, id: &str, message: &str) {
        if let Some(entry) = self.cases.get_mut(base_id(id)) {
            if entry.message.is_none() && !message.is_empty() {
                entry.message = Some(message.to_string());
            }
        }
    }

    /// Every expected id gets an outcome; extra reported ids are kept.
    fn resolve<'a>(mut self, expected: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, CaseResult> {
        for id in expected {
            if self.cases.contains_key(id) {
                continue;
            }
            let file = id.split("::").next().unwrap_or(id);
            let message = self
                .file_errors
                .get(file)
                .cloned()
                .unwrap_or_else(|| NOT_REPORTED.to_string());
            self.cases.insert(
                id.to_string(),
                CaseResult {
                    outcome: CaseOutcome::Error,
                    message: Some(message),
                },
            );
        }
        self.cases
    }
}

fn parse_output(raw: &str) -> Report {
    let mut report = Report::default();

    let (Ok(verbose), Ok(summary)) = (
        Regex::new(r"^(\S+::\S+)\s+(PASSED|FAILED|ERROR|SKIPPED|XFAIL|XPASS)\b"),
        Regex::new(r"^(FAILED|ERROR)\s+(\S+)(?:\s+-\s+(.*))?$"),
    ) else {
        return report;
    };

    for line in raw.lines().map(str::trim_end) {
        if let Some(c) = verbose.captures(line) {
            report.record(&c[1], outcome_of(&c[2]));
            continue;
        }

        if let Some(c) = summary.captures(line) {
            let target = &c[2];
            let message = c.get(3).map(|m| m.as_str().trim()).unwrap_or("");

            if target.contains("::") {
                report.record(target, outcome_of(&c[1]));
                report.annotate(target, message);
            } else {
                let message = if message.is_empty() { "collection error" } else { message };
                report
                    .file_errors
                    .entry(target.to_string())
                    .or_insert_with(|| message.to_string());
            }
        }
    }

    report
}

/// Lines `parse_output` reads; they survive the output limit.
fn is_report_line(line: &str) -> bool {
    line.contains("::") || line.starts_with("FAILED ") || line.starts_with("ERROR ")
}

fn outcome_of(status: &str) -> CaseOutcome {
    match status {
        "FAILED" => CaseOutcome::Fail,
        "ERROR" => CaseOutcome::Error,
        // SKIPPED, XFAIL and XPASS do not count against a candidate.
        _ => CaseOutcome::Pass,
    }
}

/// Parametrized ids fold into their function: `t.py::test_x[1-2]` -> `t.py::test_x`.
fn base_id(id: &str) -> &str {
    let name_start = id.rfind("::").map(|i| i + 2).unwrap_or(0);
    match id[name_start..].find('[') {
        Some(i) => &id[..name_start + i],
        None => id,
    }
}

fn relative_to(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

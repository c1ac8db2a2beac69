use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use serde::Serialize;

use crate::detectors::stub::StubShape;
use crate::error::{AttemptError, TestExecutionError};

/* ---------- tests ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestKind {
    Function,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    /// 1-based line of the `def`.
    pub line: usize,
}

/// One catalogued test, identified by its pytest node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub kind: TestKind,
    /// Class chain joined with `::` for tests inside (nested) classes.
    pub class_name: Option<String>,
    /// Qualified name of the library symbol this test appears to exercise.
    pub target: Option<String>,
    pub location: SourceLocation,
    #[serde(skip)]
    pub source: String,
}

/* ---------- targets ---------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetKind {
    FreeFunction,
    Method { class: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetStatus {
    Pending,
    InProgress,
    Accepted,
    Exhausted,
}

impl TargetStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TargetStatus::Accepted | TargetStatus::Exhausted)
    }

    fn can_advance_to(self, next: TargetStatus) -> bool {
        matches!(
            (self, next),
            (TargetStatus::Pending, TargetStatus::InProgress)
                | (TargetStatus::InProgress, TargetStatus::Accepted)
                | (TargetStatus::InProgress, TargetStatus::Exhausted)
        )
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetStatus::Pending => "pending",
            TargetStatus::InProgress => "in-progress",
            TargetStatus::Accepted => "accepted",
            TargetStatus::Exhausted => "exhausted",
        };
        f.write_str(s)
    }
}

/// A stubbed function awaiting an implementation.
#[derive(Debug, Clone, Serialize)]
pub struct ImplementationTarget {
    pub qualified_name: String,
    pub name: String,
    pub module: String,
    pub file: PathBuf,
    pub kind: TargetKind,
    pub shape: StubShape,
    /// `def ...:` header text, decorators excluded.
    pub signature: String,
    /// Bytes of the replaceable stub statements (docstring excluded).
    pub body_span: Range<usize>,
    /// 1-based, inclusive.
    pub lines: Range<usize>,
    /// Exact text under `body_span` at discovery time.
    pub stub_text: String,
    /// Indentation the body statements are written at.
    pub indent: String,
    /// True when the stub shares the `def` line (`def f(): pass`).
    pub inline: bool,
    pub has_docstring: bool,
    status: TargetStatus,
}

impl ImplementationTarget {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        qualified_name: String,
        name: String,
        module: String,
        file: PathBuf,
        kind: TargetKind,
        shape: StubShape,
        signature: String,
        body_span: Range<usize>,
        lines: Range<usize>,
        stub_text: String,
        indent: String,
        inline: bool,
        has_docstring: bool,
    ) -> Self {
        Self {
            qualified_name,
            name,
            module,
            file,
            kind,
            shape,
            signature,
            body_span,
            lines,
            stub_text,
            indent,
            inline,
            has_docstring,
            status: TargetStatus::Pending,
        }
    }

    pub fn status(&self) -> TargetStatus {
        self.status
    }

    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            TargetKind::Method { class } => Some(class),
            TargetKind::FreeFunction => None,
        }
    }

    /// Advances the status. Backward or skipping transitions are refused.
    pub fn advance(&mut self, next: TargetStatus) -> bool {
        if !self.status.can_advance_to(next) {
            tracing::error!(
                target_name = %self.qualified_name,
                from = %self.status,
                to = %next,
                "refusing status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Moves this target's spans after an edit earlier in the same file.
    pub fn shift(&mut self, byte_delta: isize, line_delta: isize) {
        self.body_span = shift_range(&self.body_span, byte_delta);
        self.lines = shift_range(&self.lines, line_delta);
    }
}

fn shift_range(r: &Range<usize>, delta: isize) -> Range<usize> {
    let apply = |v: usize| (v as isize + delta).max(0) as usize;
    apply(r.start)..apply(r.end)
}

/* ---------- attempts ---------- */

#[derive(Debug)]
pub enum AttemptOutcome {
    TestsPassed,
    TestsFailed,
    Error(AttemptError),
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::TestsPassed => "tests-passed",
            AttemptOutcome::TestsFailed => "tests-failed",
            AttemptOutcome::Error(_) => "error",
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, AttemptOutcome::TestsPassed)
    }
}

/// One proposal-write-test-evaluate cycle. Append-only.
#[derive(Debug)]
pub struct AttemptRecord {
    pub target: String,
    /// 1-based.
    pub attempt: u32,
    pub candidate: Option<String>,
    pub outcome: AttemptOutcome,
    pub failing_tests: Vec<String>,
}

/* ---------- suite results ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseOutcome {
    Pass,
    Fail,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResult {
    pub outcome: CaseOutcome,
    pub message: Option<String>,
}

/// Per-test outcomes of one runner invocation. Never mutated once built.
#[derive(Debug, Clone, Default)]
pub struct SuiteResult {
    cases: BTreeMap<String, CaseResult>,
    infrastructure_error: Option<TestExecutionError>,
}

impl SuiteResult {
    pub fn new(cases: BTreeMap<String, CaseResult>) -> Self {
        Self {
            cases,
            infrastructure_error: None,
        }
    }

    /// Every requested id is recorded as an error carrying the runner failure.
    pub fn infrastructure_failure<'a>(
        ids: impl IntoIterator<Item = &'a str>,
        err: TestExecutionError,
    ) -> Self {
        let message = err.to_string();
        let cases = ids
            .into_iter()
            .map(|id| {
                (
                    id.to_string(),
                    CaseResult {
                        outcome: CaseOutcome::Error,
                        message: Some(message.clone()),
                    },
                )
            })
            .collect();

        Self {
            cases,
            infrastructure_error: Some(err),
        }
    }

    pub fn cases(&self) -> &BTreeMap<String, CaseResult> {
        &self.cases
    }

    pub fn get(&self, id: &str) -> Option<&CaseResult> {
        self.cases.get(id)
    }

    pub fn infrastructure_error(&self) -> Option<&TestExecutionError> {
        self.infrastructure_error.as_ref()
    }

    pub fn all_passed(&self) -> bool {
        self.infrastructure_error.is_none()
            && self.cases.values().all(|c| c.outcome == CaseOutcome::Pass)
    }

    pub fn count(&self, outcome: CaseOutcome) -> usize {
        self.cases.values().filter(|c| c.outcome == outcome).count()
    }

    /// Ids that did not pass, in id order.
    pub fn failing(&self) -> Vec<String> {
        self.cases
            .iter()
            .filter(|(_, c)| c.outcome != CaseOutcome::Pass)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

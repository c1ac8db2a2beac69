//! driver/mod.rs
//!
//! The bounded retry loop: one target at a time, each attempt proposes a
//! body, writes it under a `ScopedEdit`, runs the selected tests and either
//! commits or restores.

pub mod edit;
pub mod select;

use std::fs;

use crate::catalog::Catalog;
use crate::detectors::ast::is_valid_python;
use crate::detectors::targets::function_text;
use crate::error::{AttemptError, EditError, ImplementerError};
use crate::llm::candidate::{normalize, render};
use crate::llm::{GuidingTest, Implementer, PriorAttempt, ProposalRequest};
use crate::runner::SuiteRunner;
use crate::state::{
    AttemptOutcome, AttemptRecord, CaseOutcome, ImplementationTarget, SuiteResult, TargetStatus,
};

pub use edit::ScopedEdit;
pub use select::{select, FallbackPolicy, Scope, Selection};

pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct DriverOptions {
    pub max_attempts: u32,
    pub fallback: FallbackPolicy,
    /// Tell the Implementer what earlier attempts got wrong.
    pub feedback: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            fallback: FallbackPolicy::default(),
            feedback: true,
        }
    }
}

/// Final state of one target and every attempt made on it.
#[derive(Debug)]
pub struct TargetReport {
    pub target: ImplementationTarget,
    pub scope: Scope,
    pub selected: usize,
    pub attempts: Vec<AttemptRecord>,
    /// The committed body, dedented.
    pub accepted_body: Option<String>,
}

impl TargetReport {
    pub fn status(&self) -> TargetStatus {
        self.target.status()
    }
}

pub struct Driver<'a> {
    implementer: &'a dyn Implementer,
    runner: &'a dyn SuiteRunner,
    opts: DriverOptions,
}

/// What one attempt left behind.
struct AttemptResult {
    record: AttemptRecord,
    messages: Vec<String>,
    accepted: Option<Accepted>,
}

struct Accepted {
    body: String,
    byte_delta: isize,
    line_delta: isize,
}

impl<'a> Driver<'a> {
    pub fn new(implementer: &'a dyn Implementer, runner: &'a dyn SuiteRunner, opts: DriverOptions) -> Self {
        Self {
            implementer,
            runner,
            opts,
        }
    }

    /// Processes targets in order. Never fails: every target ends accepted
    /// or exhausted.
    pub fn run(&self, mut targets: Vec<ImplementationTarget>, catalog: &Catalog) -> Vec<TargetReport> {
        let mut reports = Vec::with_capacity(targets.len());

        for i in 0..targets.len() {
            let (report, shift) = self.process(targets[i].clone(), catalog);

            if let Some((byte_delta, line_delta)) = shift {
                let file = &report.target.file;
                let edited_end = targets[i].body_span.end;
                for later in targets[i + 1..].iter_mut() {
                    if later.file == *file && later.body_span.start >= edited_end {
                        later.shift(byte_delta, line_delta);
                    }
                }
            }

            reports.push(report);
        }

        reports
    }

    fn process(
        &self,
        mut target: ImplementationTarget,
        catalog: &Catalog,
    ) -> (TargetReport, Option<(isize, isize)>) {
        let selection = select(catalog, &target, self.opts.fallback);
        let selected = selection.cases.len();

        target.advance(TargetStatus::InProgress);
        tracing::info!(
            target_name = %target.qualified_name,
            scope = ?selection.scope,
            selected,
            "implementing"
        );

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut history: Vec<PriorAttempt> = Vec::new();
        let mut accepted: Option<Accepted> = None;

        for attempt in 1..=self.opts.max_attempts {
            let result = self.attempt(&target, &selection, catalog, attempt, &history);
            let record = result.record;

            if let Some(ok) = result.accepted {
                tracing::info!(target_name = %target.qualified_name, attempt, "accepted");
                attempts.push(record);
                accepted = Some(ok);
                break;
            }

            tracing::warn!(
                target_name = %target.qualified_name,
                attempt,
                outcome = record.outcome.label(),
                failing = record.failing_tests.len(),
                "attempt rejected"
            );

            if self.opts.feedback {
                history.push(PriorAttempt {
                    attempt,
                    candidate: record.candidate.clone(),
                    outcome: record.outcome.label().to_string(),
                    failing_tests: record.failing_tests.clone(),
                    messages: result.messages,
                });
            }
            attempts.push(record);
        }

        let shift = match &accepted {
            Some(ok) => {
                target.advance(TargetStatus::Accepted);
                Some((ok.byte_delta, ok.line_delta))
            }
            None => {
                target.advance(TargetStatus::Exhausted);
                tracing::warn!(
                    target_name = %target.qualified_name,
                    attempts = attempts.len(),
                    "exhausted, stub left in place"
                );
                None
            }
        };

        let report = TargetReport {
            target,
            scope: selection.scope,
            selected,
            attempts,
            accepted_body: accepted.map(|a| a.body),
        };
        (report, shift)
    }

    fn attempt(
        &self,
        target: &ImplementationTarget,
        selection: &Selection,
        catalog: &Catalog,
        attempt: u32,
        history: &[PriorAttempt],
    ) -> AttemptResult {
        let failed = |candidate: Option<String>, err: AttemptError| {
            let messages = vec![err.to_string()];
            AttemptResult {
                record: AttemptRecord {
                    target: target.qualified_name.clone(),
                    attempt,
                    candidate,
                    outcome: AttemptOutcome::Error(err),
                    failing_tests: Vec::new(),
                },
                messages,
                accepted: None,
            }
        };

        let request = match self.request(target, selection, history) {
            Ok(r) => r,
            Err(e) => return failed(None, e.into()),
        };

        let raw = match self.implementer.propose(&request) {
            Ok(raw) => raw,
            Err(e) => return failed(None, e.into()),
        };

        let body = match normalize(&raw, target) {
            Ok(body) => body,
            Err(e) => return failed(Some(raw), e.into()),
        };

        let replacement = render(&body, target);
        let edit = match ScopedEdit::apply(
            &target.file,
            target.body_span.clone(),
            &target.stub_text,
            &replacement,
        ) {
            Ok(edit) => edit,
            Err(e) => return failed(Some(body), e.into()),
        };

        if !is_valid_python(edit.updated()) {
            let err = ImplementerError::Malformed("candidate leaves the file unparseable".into());
            return failed(Some(body), err.into());
        }

        let result = if selection.is_empty() {
            SuiteResult::default()
        } else if selection.scope == Scope::FullSuite {
            self.runner.run_all(catalog)
        } else {
            self.runner.run(&selection.cases)
        };

        let failing_tests = result.failing();
        let messages = failure_messages(&result);

        let outcome = if let Some(err) = result.infrastructure_error() {
            AttemptOutcome::Error(err.clone().into())
        } else if result.all_passed() {
            AttemptOutcome::TestsPassed
        } else {
            AttemptOutcome::TestsFailed
        };

        let accepted = if outcome.passed() {
            let byte_delta = edit.byte_delta();
            let line_delta = edit.line_delta();
            edit.commit();
            Some(Accepted {
                body: body.clone(),
                byte_delta,
                line_delta,
            })
        } else {
            if let Err(e) = edit.rollback() {
                tracing::error!(target_name = %target.qualified_name, err = %e, "restore failed");
            }
            None
        };

        AttemptResult {
            record: AttemptRecord {
                target: target.qualified_name.clone(),
                attempt,
                candidate: Some(body),
                outcome,
                failing_tests,
            },
            messages,
            accepted,
        }
    }

    fn request(
        &self,
        target: &ImplementationTarget,
        selection: &Selection,
        history: &[PriorAttempt],
    ) -> Result<ProposalRequest, EditError> {
        let source = fs::read_to_string(&target.file).map_err(|source| EditError::Io {
            path: target.file.clone(),
            source,
        })?;

        let function_source = function_text(&source, target)
            .unwrap_or_else(|| format!("{}:\n{}{}", target.signature, target.indent, target.stub_text));

        Ok(ProposalRequest {
            qualified_name: target.qualified_name.clone(),
            file: target.file.clone(),
            signature: target.signature.clone(),
            stub_shape: target.shape,
            function_source,
            file_context: source,
            keeps_docstring: target.has_docstring,
            guiding_tests: selection
                .cases
                .iter()
                .map(|c| GuidingTest {
                    id: c.id.clone(),
                    source: c.source.clone(),
                })
                .collect(),
            previous_attempts: history.to_vec(),
        })
    }
}

fn failure_messages(result: &SuiteResult) -> Vec<String> {
    if let Some(err) = result.infrastructure_error() {
        return vec![err.to_string()];
    }

    result
        .cases()
        .iter()
        .filter(|(_, c)| c.outcome != CaseOutcome::Pass)
        .map(|(id, c)| match &c.message {
            Some(m) => format!("{id}: {m}"),
            None => id.clone(),
        })
        .collect()
}

//! End-to-end runs over temporary Python projects with a scripted
//! Implementer and a runner that decides outcomes by reading the source.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use stubsmith::catalog::Catalog;
use stubsmith::driver::Scope;
use stubsmith::error::{AttemptError, ImplementerError, TestExecutionError};
use stubsmith::state::{
    AttemptOutcome, CaseOutcome, CaseResult, SuiteResult, TargetStatus, TestCase,
};
use stubsmith::{Config, FallbackPolicy, Implementer, ProposalRequest, Roots, SuiteRunner};

/* ---------- fixtures ---------- */

struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    fn new() -> Self {
        let p = Self {
            dir: tempfile::tempdir().expect("tempdir"),
        };
        p.write("pkg/__init__.py", "");
        p
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read")
    }

    fn roots(&self) -> Roots {
        Roots::resolve(&self.path("pkg"), &self.path("tests"), None).expect("roots")
    }
}

/// Answers from a per-function script; records every request.
#[derive(Default)]
struct ScriptedImplementer {
    script: RefCell<HashMap<String, VecDeque<Result<String, ImplementerError>>>>,
    requests: RefCell<Vec<ProposalRequest>>,
}

impl ScriptedImplementer {
    fn answer(self, function: &str, answers: Vec<Result<&str, ImplementerError>>) -> Self {
        self.script.borrow_mut().insert(
            function.to_string(),
            answers.into_iter().map(|a| a.map(str::to_string)).collect(),
        );
        self
    }
}

impl Implementer for ScriptedImplementer {
    fn name(&self) -> &str {
        "scripted"
    }

    fn propose(&self, request: &ProposalRequest) -> Result<String, ImplementerError> {
        self.requests.borrow_mut().push(request.clone());
        let short = request
            .qualified_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_string();
        self.script
            .borrow_mut()
            .get_mut(&short)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(ImplementerError::Unavailable("script exhausted".into())))
    }
}

/// A test passes when its rule's file contains the rule's needle.
#[derive(Default)]
struct SourceRunner {
    rules: Vec<(String, PathBuf, String)>,
    broken: Cell<bool>,
    calls: Cell<usize>,
}

impl SourceRunner {
    fn rule(mut self, test_id: &str, file: PathBuf, needle: &str) -> Self {
        self.rules.push((test_id.to_string(), file, needle.to_string()));
        self
    }

    fn judge<'a>(&self, ids: impl Iterator<Item = &'a str>) -> SuiteResult {
        self.calls.set(self.calls.get() + 1);
        let ids: Vec<&str> = ids.collect();

        if self.broken.get() {
            return SuiteResult::infrastructure_failure(ids, TestExecutionError::Timeout(1));
        }

        let cases: BTreeMap<String, CaseResult> = ids
            .into_iter()
            .map(|id| {
                let pass = self
                    .rules
                    .iter()
                    .filter(|(rule_id, _, _)| rule_id == id)
                    .all(|(_, file, needle)| {
                        fs::read_to_string(file).map(|s| s.contains(needle)).unwrap_or(false)
                    });
                let result = CaseResult {
                    outcome: if pass { CaseOutcome::Pass } else { CaseOutcome::Fail },
                    message: (!pass).then(|| "assertion failed".to_string()),
                };
                (id.to_string(), result)
            })
            .collect();

        SuiteResult::new(cases)
    }
}

impl SuiteRunner for SourceRunner {
    fn run(&self, cases: &[&TestCase]) -> SuiteResult {
        self.judge(cases.iter().map(|c| c.id.as_str()))
    }

    fn run_all(&self, catalog: &Catalog) -> SuiteResult {
        self.judge(catalog.cases.iter().map(|c| c.id.as_str()))
    }
}

const OPS: &str = "\
def f(x):
    pass


def g(x):
    \"\"\"Negate x.\"\"\"
    raise NotImplementedError
";

const TEST_OPS: &str = "\
from pkg.ops import f, g


def test_f():
    assert f(2) == 4


def test_g():
    assert g(1) == -1
";

fn ops_project() -> Project {
    let p = Project::new();
    p.write("pkg/ops.py", OPS);
    p.write("tests/test_ops.py", TEST_OPS);
    p
}

fn ops_runner(p: &Project) -> SourceRunner {
    SourceRunner::default()
        .rule("tests/test_ops.py::test_f", p.path("pkg/ops.py"), "return x * 2")
        .rule("tests/test_ops.py::test_g", p.path("pkg/ops.py"), "return -x")
}

/* ---------- scenarios ---------- */

#[test]
fn accepted_on_second_attempt_and_exhausted_target_restored() {
    let p = ops_project();
    let implementer = ScriptedImplementer::default()
        .answer("f", vec![Ok("return x + 2"), Ok("```python\nreturn x * 2\n```")])
        .answer("g", vec![Ok("return x"), Ok("return 0"), Ok("return x - 1")]);
    let runner = ops_runner(&p);
    let cfg = Config::default();

    let ws = stubsmith::scan(p.roots(), &cfg);
    assert_eq!(ws.targets.len(), 2);
    let run = stubsmith::execute(ws, &cfg, &implementer, &runner);

    let f = &run.targets[0];
    assert_eq!(f.target.qualified_name, "pkg.ops.f");
    assert_eq!(f.scope, Scope::Associated);
    assert_eq!(f.status(), TargetStatus::Accepted);
    let outcomes: Vec<_> = f.attempts.iter().map(|a| a.outcome.label()).collect();
    assert_eq!(outcomes, vec!["tests-failed", "tests-passed"]);
    assert_eq!(f.attempts[0].failing_tests, vec!["tests/test_ops.py::test_f"]);
    assert_eq!(f.attempts[1].candidate.as_deref(), Some("return x * 2"));

    let g = &run.targets[1];
    assert_eq!(g.status(), TargetStatus::Exhausted);
    assert_eq!(g.attempts.len(), 3);
    assert!(g.attempts.iter().all(|a| a.outcome.label() == "tests-failed"));
    let indices: Vec<u32> = g.attempts.iter().map(|a| a.attempt).collect();
    assert_eq!(indices, vec![1, 2, 3]);

    // f keeps attempt 2; g's stub is back byte for byte.
    assert_eq!(p.read("pkg/ops.py"), OPS.replacen("    pass", "    return x * 2", 1));

    assert_eq!(run.suite.count(CaseOutcome::Pass), 1);
    assert_eq!(run.suite.failing(), vec!["tests/test_ops.py::test_g"]);
}

#[test]
fn rerun_keeps_accepted_target_and_retries_the_rest() {
    let p = ops_project();
    let cfg = Config::default();
    let implementer = ScriptedImplementer::default().answer("f", vec![Ok("return x * 2")]);
    let runner = ops_runner(&p);

    let run = stubsmith::execute(stubsmith::scan(p.roots(), &cfg), &cfg, &implementer, &runner);
    assert_eq!(run.targets[0].status(), TargetStatus::Accepted);
    assert_eq!(run.targets[1].status(), TargetStatus::Exhausted);

    let ws = stubsmith::scan(p.roots(), &cfg);
    let names: Vec<_> = ws.targets.iter().map(|t| t.qualified_name.as_str()).collect();
    assert_eq!(names, vec!["pkg.ops.g"]);
    assert_eq!(ws.targets[0].status(), TargetStatus::Pending);
}

#[test]
fn implementer_errors_and_bad_candidates_burn_attempts() {
    let p = ops_project();
    let implementer = ScriptedImplementer::default().answer(
        "f",
        vec![
            Err(ImplementerError::Unavailable("offline".into())),
            Ok("return (x *"),
            Ok("return x * 2"),
        ],
    );
    let runner = ops_runner(&p);
    let mut cfg = Config::default();
    cfg.skip_functions = vec!["g".into()];

    let run = stubsmith::execute(stubsmith::scan(p.roots(), &cfg), &cfg, &implementer, &runner);
    let f = &run.targets[0];

    assert_eq!(f.status(), TargetStatus::Accepted);
    assert!(matches!(
        f.attempts[0].outcome,
        AttemptOutcome::Error(AttemptError::Implementer(ImplementerError::Unavailable(_)))
    ));
    assert!(matches!(
        f.attempts[1].outcome,
        AttemptOutcome::Error(AttemptError::Implementer(ImplementerError::Malformed(_)))
    ));
    assert!(f.attempts[2].outcome.passed());
    // One runner call for the passing attempt plus the final suite run.
    assert_eq!(runner.calls.get(), 2);
}

#[test]
fn infrastructure_errors_exhaust_without_touching_source() {
    let p = ops_project();
    let implementer = ScriptedImplementer::default()
        .answer("f", vec![Ok("return x * 2"), Ok("return x * 2"), Ok("return x * 2")]);
    let runner = ops_runner(&p);
    runner.broken.set(true);
    let mut cfg = Config::default();
    cfg.skip_functions = vec!["g".into()];

    let run = stubsmith::execute(stubsmith::scan(p.roots(), &cfg), &cfg, &implementer, &runner);
    let f = &run.targets[0];

    assert_eq!(f.status(), TargetStatus::Exhausted);
    assert_eq!(f.attempts.len(), 3);
    for a in &f.attempts {
        assert!(matches!(
            a.outcome,
            AttemptOutcome::Error(AttemptError::TestExecution(TestExecutionError::Timeout(1)))
        ));
        assert_eq!(a.failing_tests, vec!["tests/test_ops.py::test_f"]);
    }
    assert_eq!(p.read("pkg/ops.py"), OPS);
    assert!(run.suite.infrastructure_error().is_some());
}

#[test]
fn failures_are_fed_back_to_the_implementer() {
    let p = ops_project();
    let implementer =
        ScriptedImplementer::default().answer("f", vec![Ok("return x + 2"), Ok("return x * 2")]);
    let runner = ops_runner(&p);
    let mut cfg = Config::default();
    cfg.skip_functions = vec!["g".into()];

    stubsmith::execute(stubsmith::scan(p.roots(), &cfg), &cfg, &implementer, &runner);

    let requests = implementer.requests.borrow();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].previous_attempts.is_empty());
    assert_eq!(requests[0].guiding_tests[0].id, "tests/test_ops.py::test_f");
    assert!(requests[0].guiding_tests[0].source.contains("assert f(2) == 4"));
    // Every attempt starts from the pristine stub.
    assert!(requests[1].function_source.ends_with("    pass"));

    let prior = &requests[1].previous_attempts[0];
    assert_eq!(prior.attempt, 1);
    assert_eq!(prior.candidate.as_deref(), Some("return x + 2"));
    assert_eq!(prior.failing_tests, vec!["tests/test_ops.py::test_f"]);
    assert!(prior.messages[0].contains("assertion failed"));

    let p2 = ops_project();
    let quiet = ScriptedImplementer::default().answer("f", vec![Ok("return x + 2"), Ok("return x * 2")]);
    cfg.feedback = false;
    stubsmith::execute(stubsmith::scan(p2.roots(), &cfg), &cfg, &quiet, &ops_runner(&p2));
    assert!(quiet.requests.borrow()[1].previous_attempts.is_empty());
}

#[test]
fn later_targets_in_the_same_file_follow_earlier_edits() {
    let p = Project::new();
    let source = "\
class Box:
    def __init__(self, w, h):
        self.w = w
        self.h = h

    def area(self): pass

    def perimeter(self):
        ...
";
    p.write("pkg/shapes.py", source);
    p.write(
        "tests/test_shapes.py",
        "from pkg.shapes import Box\n\n\nclass TestBox:\n    def test_area(self):\n        assert Box(2, 3).area() == 6\n\n    def test_perimeter(self):\n        assert Box(2, 3).perimeter() == 10\n",
    );

    let implementer = ScriptedImplementer::default()
        .answer("area", vec![Ok("w = self.w\nh = self.h\nreturn w * h")])
        .answer("perimeter", vec![Ok("def perimeter(self):\n    return 2 * (self.w + self.h)")]);
    let shapes = p.path("pkg/shapes.py");
    let runner = SourceRunner::default()
        .rule("tests/test_shapes.py::TestBox::test_area", shapes.clone(), "return w * h")
        .rule("tests/test_shapes.py::TestBox::test_perimeter", shapes, "return 2 * (self.w + self.h)");
    let cfg = Config::default();

    let run = stubsmith::execute(stubsmith::scan(p.roots(), &cfg), &cfg, &implementer, &runner);
    assert!(run.targets.iter().all(|t| t.status() == TargetStatus::Accepted));

    assert_eq!(
        p.read("pkg/shapes.py"),
        "\
class Box:
    def __init__(self, w, h):
        self.w = w
        self.h = h

    def area(self):
        w = self.w
        h = self.h
        return w * h

    def perimeter(self):
        return 2 * (self.w + self.h)
"
    );
}

#[test]
fn broken_test_file_is_skipped_with_one_warning() {
    let p = ops_project();
    p.write("tests/test_broken.py", "def test_x(:\n    pass\n");
    p.write("tests/test_more.py", "def test_other():\n    assert True\n");

    let ws = stubsmith::scan(p.roots(), &Config::default());

    assert_eq!(ws.catalog.warnings.len(), 1);
    assert!(ws.catalog.warnings[0].path().ends_with("test_broken.py"));
    let ids: Vec<_> = ws.catalog.cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "tests/test_more.py::test_other",
            "tests/test_ops.py::test_f",
            "tests/test_ops.py::test_g",
        ]
    );
    assert_eq!(ws.catalog.unassociated(), 1);
}

#[test]
fn unassociated_target_falls_back_per_policy() {
    let p = Project::new();
    p.write("pkg/text.py", "def shout(s):\n    pass\n");
    p.write("tests/test_text.py", "def test_loud():\n    assert True\n");
    p.write("tests/test_other.py", "def test_unrelated():\n    assert True\n");

    let mut cfg = Config::default();
    let implementer = ScriptedImplementer::default().answer("shout", vec![Ok("return s.upper()")]);
    let run = stubsmith::execute(
        stubsmith::scan(p.roots(), &cfg),
        &cfg,
        &implementer,
        &SourceRunner::default(),
    );
    assert_eq!(run.targets[0].scope, Scope::FullSuite);
    assert_eq!(run.targets[0].selected, 2);

    let p = Project::new();
    p.write("pkg/text.py", "def shout(s):\n    pass\n");
    p.write("tests/test_text.py", "def test_loud():\n    assert True\n");
    p.write("tests/test_other.py", "def test_unrelated():\n    assert True\n");
    cfg.fallback = FallbackPolicy::SameModule;
    let implementer = ScriptedImplementer::default().answer("shout", vec![Ok("return s.upper()")]);
    let run = stubsmith::execute(
        stubsmith::scan(p.roots(), &cfg),
        &cfg,
        &implementer,
        &SourceRunner::default(),
    );
    assert_eq!(run.targets[0].scope, Scope::SameModule);
    assert_eq!(run.targets[0].selected, 1);
    assert_eq!(run.targets[0].status(), TargetStatus::Accepted);
}

#[test]
fn empty_catalog_accepts_first_parseable_candidate() {
    let p = Project::new();
    p.write("pkg/util.py", "def ident(x):\n    ...\n");
    fs::create_dir_all(p.path("tests")).expect("mkdir");

    let implementer =
        ScriptedImplementer::default().answer("ident", vec![Ok("return x +"), Ok("return x")]);
    let runner = SourceRunner::default();
    let cfg = Config::default();

    let run = stubsmith::execute(stubsmith::scan(p.roots(), &cfg), &cfg, &implementer, &runner);
    let t = &run.targets[0];

    assert_eq!(t.scope, Scope::Empty);
    assert_eq!(t.attempts.len(), 2);
    assert_eq!(t.status(), TargetStatus::Accepted);
    assert_eq!(p.read("pkg/util.py"), "def ident(x):\n    return x\n");
    assert_eq!(runner.calls.get(), 0);
}

#[test]
fn missing_roots_fail_setup() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(Roots::resolve(&dir.path().join("lib"), dir.path(), None).is_err());
    assert!(Roots::resolve(dir.path(), Path::new("/definitely/not/here"), None).is_err());
}

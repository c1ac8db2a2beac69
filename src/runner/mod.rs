pub mod pytest;

use crate::catalog::Catalog;
use crate::state::{SuiteResult, TestCase};

pub use pytest::PytestRunner;

/// Executes tests and reports a per-case outcome.
///
/// Implementations never fail out of a batch: a runner that cannot execute
/// at all records that as `SuiteResult::infrastructure_error`.
pub trait SuiteRunner {
    /// Runs exactly these cases.
    fn run(&self, cases: &[&TestCase]) -> SuiteResult;

    /// Runs the whole test tree of `catalog`.
    fn run_all(&self, catalog: &Catalog) -> SuiteResult;
}

//! Test-driven implementation of stubbed Python functions.
//!
//! Stubs are discovered in a library tree, tests are catalogued and mapped
//! to them, and each stub gets a bounded number of attempts from an
//! `Implementer`. A candidate stays only when its selected tests pass;
//! otherwise the file is restored byte for byte.

pub mod catalog;
pub mod config;
pub mod detectors;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod llm;
pub mod logger;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod runner;
pub mod state;

pub use catalog::Catalog;
pub use config::{load_config, Config};
pub use driver::{Driver, DriverOptions, FallbackPolicy, TargetReport, MAX_ATTEMPTS};
pub use llm::{Implementer, ProposalRequest};
pub use pipeline::{execute, scan, Roots, Workspace};
pub use report::RunReport;
pub use runner::SuiteRunner;

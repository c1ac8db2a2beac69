//! Error taxonomy.
//!
//! Only `SetupError` is fatal. Everything else is recovered where it happens:
//! scan errors skip a file, attempt errors burn one attempt.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A source or test file that could not be scanned.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: syntax error near line {line}")]
    Syntax { path: PathBuf, line: usize },

    #[error("{path}: parser produced no tree")]
    NoTree { path: PathBuf },
}

impl ScanError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::Read { path, .. }
            | ScanError::Syntax { path, .. }
            | ScanError::NoTree { path } => path,
        }
    }
}

/// The Implementer could not produce a usable candidate.
#[derive(Debug, Error)]
pub enum ImplementerError {
    #[error("implementer unavailable: {0}")]
    Unavailable(String),

    #[error("implementer request failed: {0}")]
    Request(String),

    #[error("malformed candidate: {0}")]
    Malformed(String),
}

/// The suite runner could not execute tests at all (as opposed to tests failing).
#[derive(Debug, Clone, Error)]
pub enum TestExecutionError {
    #[error("failed to launch test runner: {0}")]
    Spawn(String),

    #[error("test run exceeded {0}s")]
    Timeout(u64),

    #[error("test runner exited with code {code}: {detail}")]
    Runner { code: i32, detail: String },
}

/// Writing or restoring a candidate in the source tree failed.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: stub at bytes {start}..{end} no longer matches the scanned source")]
    StaleSpan {
        path: PathBuf,
        start: usize,
        end: usize,
    },
}

/// Why a single attempt ended without passing tests.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Implementer(#[from] ImplementerError),

    #[error(transparent)]
    TestExecution(#[from] TestExecutionError),

    #[error(transparent)]
    Edit(#[from] EditError),
}

impl AttemptError {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Implementer(_) => "implementer",
            AttemptError::TestExecution(_) => "test-execution",
            AttemptError::Edit(_) => "edit",
        }
    }
}

/// Conditions that abort the run before any target is processed.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{label} root does not exist or is not a directory: {path}")]
    MissingRoot { label: &'static str, path: PathBuf },

    #[error("cannot resolve {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub mod candidate;
pub mod client;
pub mod command;
pub mod prompt;

use std::path::PathBuf;

use serde::Serialize;

use crate::detectors::stub::StubShape;
use crate::error::ImplementerError;

pub use client::{HttpImplementer, Provider, ProviderConfig};
pub use command::CommandImplementer;

/// A test shown to the Implementer as guidance.
#[derive(Debug, Clone, Serialize)]
pub struct GuidingTest {
    pub id: String,
    pub source: String,
}

/// What an earlier attempt produced and how it failed.
#[derive(Debug, Clone, Serialize)]
pub struct PriorAttempt {
    pub attempt: u32,
    pub candidate: Option<String>,
    pub outcome: String,
    pub failing_tests: Vec<String>,
    pub messages: Vec<String>,
}

/// Everything the Implementer gets to see for one attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalRequest {
    pub qualified_name: String,
    pub file: PathBuf,
    pub signature: String,
    pub stub_shape: StubShape,
    /// The full stubbed function as it currently reads.
    pub function_source: String,
    /// Containing file, possibly truncated.
    pub file_context: String,
    /// The stub keeps its docstring; the answer should not repeat it.
    pub keeps_docstring: bool,
    pub guiding_tests: Vec<GuidingTest>,
    pub previous_attempts: Vec<PriorAttempt>,
}

/// Produces candidate source text for a stubbed function body.
pub trait Implementer {
    fn name(&self) -> &str;
    fn propose(&self, request: &ProposalRequest) -> Result<String, ImplementerError>;
}

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use serde::Serialize;

use crate::error::ImplementerError;
use crate::llm::prompt::{build_prompt, LlmPrompt, PromptLimits};
use crate::llm::{Implementer, ProposalRequest};
use crate::process::{run_with_timeout, Capture};

const OUTPUT_LIMIT: usize = 1 << 20;

/// Implementer backed by a local program.
///
/// The program receives one JSON document on stdin (the request plus a
/// rendered prompt) and prints the candidate on stdout.
pub struct CommandImplementer {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    limits: PromptLimits,
    timeout: Duration,
}

#[derive(Serialize)]
struct Envelope<'a> {
    request: &'a ProposalRequest,
    prompt: PromptView<'a>,
}

#[derive(Serialize)]
struct PromptView<'a> {
    system: &'a str,
    user: &'a str,
}

impl CommandImplementer {
    /// `argv[0]` is the program; the rest are passed through.
    pub fn new(argv: &[String], limits: PromptLimits, timeout: Duration) -> Result<Self, ImplementerError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| ImplementerError::Unavailable("empty implementer command".into()))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            cwd: None,
            limits,
            timeout,
        })
    }

    pub fn current_dir(mut self, dir: PathBuf) -> Self {
        self.cwd = Some(dir);
        self
    }

    fn payload(&self, request: &ProposalRequest, prompt: &LlmPrompt) -> Result<Vec<u8>, ImplementerError> {
        let envelope = Envelope {
            request,
            prompt: PromptView {
                system: &prompt.system,
                user: &prompt.user,
            },
        };
        serde_json::to_vec(&envelope).map_err(|e| ImplementerError::Request(e.to_string()))
    }
}

impl Implementer for CommandImplementer {
    fn name(&self) -> &str {
        &self.program
    }

    fn propose(&self, request: &ProposalRequest) -> Result<String, ImplementerError> {
        let prompt = build_prompt(request, self.limits);
        let input = self.payload(request, &prompt)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        let out = run_with_timeout(cmd, Some(&input), self.timeout, Capture::bounded(OUTPUT_LIMIT))
            .map_err(|e| ImplementerError::Unavailable(format!("{}: {e}", self.program)))?;

        if out.timed_out {
            return Err(ImplementerError::Request(format!(
                "{} exceeded {}s",
                self.program,
                self.timeout.as_secs()
            )));
        }
        if !out.success() {
            return Err(ImplementerError::Request(format!(
                "{} exited with {:?}: {}",
                self.program,
                out.code(),
                out.stderr.trim()
            )));
        }

        Ok(out.stdout.trim_end().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::detectors::stub::StubShape;

    fn request() -> ProposalRequest {
        ProposalRequest {
            qualified_name: "m.f".into(),
            file: PathBuf::from("m.py"),
            signature: "def f()".into(),
            stub_shape: StubShape::Placeholder,
            function_source: "def f():\n    pass".into(),
            file_context: String::new(),
            keeps_docstring: false,
            guiding_tests: Vec::new(),
            previous_attempts: Vec::new(),
        }
    }

    fn sh(script: &str) -> CommandImplementer {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        CommandImplementer::new(&argv, PromptLimits::default(), Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn returns_stdout() {
        let implementer = sh("cat >/dev/null; echo 'return 42'");
        assert_eq!(implementer.propose(&request()).unwrap(), "return 42");
    }

    #[test]
    fn receives_request_json() {
        let implementer = sh("grep -q '\"qualified_name\":\"m.f\"' && echo ok");
        assert_eq!(implementer.propose(&request()).unwrap(), "ok");
    }

    #[test]
    fn nonzero_exit_is_request_error() {
        let implementer = sh("cat >/dev/null; echo boom >&2; exit 2");
        let err = implementer.propose(&request()).unwrap_err();
        assert!(matches!(err, ImplementerError::Request(ref m) if m.contains("boom")));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let argv = vec!["/nonexistent/stubsmith-implementer".to_string()];
        let implementer =
            CommandImplementer::new(&argv, PromptLimits::default(), Duration::from_secs(1)).unwrap();
        assert!(matches!(
            implementer.propose(&request()),
            Err(ImplementerError::Unavailable(_))
        ));
        assert!(CommandImplementer::new(&[], PromptLimits::default(), Duration::from_secs(1)).is_err());
    }
}

use crate::llm::ProposalRequest;

#[derive(Debug, Clone)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

/// Caps on how much surrounding text goes into a prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub file_context_chars: usize,
    pub test_source_chars: usize,
    pub max_tests: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            file_context_chars: 12_000,
            test_source_chars: 2_000,
            max_tests: 12,
        }
    }
}

pub fn build_prompt(req: &ProposalRequest, limits: PromptLimits) -> LlmPrompt {
    LlmPrompt {
        system: system_prompt(),
        user: user_prompt(req, limits),
    }
}

/* ============================================================
   System prompt (stable, reused)
   ============================================================ */

fn system_prompt() -> String {
    r#"
You are an expert Python engineer implementing a single stubbed function.

Rules:
- Output ONLY the statements of the function body, nothing else
- Do NOT repeat the def line, decorators or the docstring
- Do NOT modify other functions, imports or module state
- The body must make the listed tests pass
- No explanations, no Markdown outside a single optional code block
"#
    .trim()
    .to_string()
}

/* ============================================================
   User prompt (derived from the proposal request)
   ============================================================ */

fn user_prompt(req: &ProposalRequest, limits: PromptLimits) -> String {
    let mut out = String::new();

    /* ---------- TARGET ---------- */
    out.push_str("TARGET\n");
    out.push_str(&format!("Function: {}\n", req.qualified_name));
    out.push_str(&format!("File: {}\n", req.file.display()));
    out.push_str(&format!("Signature: {}\n", req.signature));
    out.push_str(&format!("Current body: {}\n", req.stub_shape.describe()));
    if req.keeps_docstring {
        out.push_str("The existing docstring is kept; return only the statements after it.\n");
    }
    out.push('\n');

    out.push_str("STUB\n```python\n");
    out.push_str(&req.function_source);
    out.push_str("\n```\n\n");

    /* ---------- FILE CONTEXT ---------- */
    out.push_str("FILE CONTEXT\n```python\n");
    out.push_str(&truncate_middle(&req.file_context, limits.file_context_chars));
    out.push_str("\n```\n\n");

    /* ---------- TESTS ---------- */
    out.push_str("TESTS\n");
    if req.guiding_tests.is_empty() {
        out.push_str("No tests are associated with this function. Implement it from its name, signature and docstring.\n\n");
    } else {
        for t in req.guiding_tests.iter().take(limits.max_tests) {
            out.push_str(&format!("# {}\n```python\n", t.id));
            out.push_str(&truncate_middle(&t.source, limits.test_source_chars));
            out.push_str("\n```\n");
        }
        let hidden = req.guiding_tests.len().saturating_sub(limits.max_tests);
        if hidden > 0 {
            out.push_str(&format!("({hidden} more tests not shown)\n"));
        }
        out.push('\n');
    }

    /* ---------- FEEDBACK ---------- */
    if !req.previous_attempts.is_empty() {
        out.push_str("PREVIOUS ATTEMPTS (rejected, source was restored)\n");
        for a in &req.previous_attempts {
            out.push_str(&format!("Attempt {} -> {}\n", a.attempt, a.outcome));
            if let Some(c) = &a.candidate {
                out.push_str("```python\n");
                out.push_str(c);
                out.push_str("\n```\n");
            }
            for id in &a.failing_tests {
                out.push_str(&format!("- failing: {id}\n"));
            }
            for m in &a.messages {
                out.push_str(&format!("- {m}\n"));
            }
        }
        out.push_str("Do not repeat a rejected body.\n\n");
    }

    out.push_str("Return the function body now.\n");
    out
}

/* ============================================================
   Helpers
   ============================================================ */

/// Keeps head and tail of long text, marking the cut.
fn truncate_middle(s: &str, limit: usize) -> String {
    let count = s.chars().count();
    if count <= limit {
        return s.to_string();
    }

    let half = limit / 2;
    let head: String = s.chars().take(half).collect();
    let tail: String = s.chars().skip(count - half).collect();
    format!("{head}\n# ...truncated...\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::detectors::stub::StubShape;
    use crate::llm::{GuidingTest, PriorAttempt};

    fn request() -> ProposalRequest {
        ProposalRequest {
            qualified_name: "lib.ops.mul".into(),
            file: PathBuf::from("lib/ops.py"),
            signature: "def mul(x: float, y: float) -> float".into(),
            stub_shape: StubShape::NotImplemented,
            function_source: "def mul(x: float, y: float) -> float:\n    raise NotImplementedError".into(),
            file_context: "import math\n".into(),
            keeps_docstring: false,
            guiding_tests: vec![GuidingTest {
                id: "tests/test_ops.py::test_mul".into(),
                source: "def test_mul():\n    assert mul(2, 3) == 6".into(),
            }],
            previous_attempts: Vec::new(),
        }
    }

    #[test]
    fn prompt_carries_target_and_tests() {
        let p = build_prompt(&request(), PromptLimits::default());
        assert!(p.system.contains("ONLY the statements"));
        assert!(p.user.contains("Function: lib.ops.mul"));
        assert!(p.user.contains("tests/test_ops.py::test_mul"));
        assert!(p.user.contains("raises NotImplementedError"));
        assert!(!p.user.contains("PREVIOUS ATTEMPTS"));
    }

    #[test]
    fn prompt_includes_feedback() {
        let mut req = request();
        req.previous_attempts.push(PriorAttempt {
            attempt: 1,
            candidate: Some("return x + y".into()),
            outcome: "tests-failed".into(),
            failing_tests: vec!["tests/test_ops.py::test_mul".into()],
            messages: vec!["assert 5 == 6".into()],
        });

        let p = build_prompt(&req, PromptLimits::default());
        assert!(p.user.contains("Attempt 1 -> tests-failed"));
        assert!(p.user.contains("return x + y"));
        assert!(p.user.contains("assert 5 == 6"));
    }

    #[test]
    fn long_context_is_truncated() {
        let s = "x".repeat(100);
        let t = truncate_middle(&s, 10);
        assert!(t.starts_with("xxxxx\n# ...truncated...\n"));
        assert!(t.ends_with("xxxxx"));
        assert_eq!(truncate_middle("short", 10), "short");
    }
}

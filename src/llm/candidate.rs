//! llm/candidate.rs
//!
//! Turns raw Implementer output into a function body that can be spliced
//! over a stub, and renders it at the stub's indentation.

use crate::detectors::ast::{declarations, parse_python};
use crate::detectors::stub::is_docstring;
use crate::error::ImplementerError;
use crate::state::ImplementationTarget;

const WRAPPER: &str = "def __candidate__():\n";

/// Cleans a raw answer into dedented body statements.
///
/// Accepts a bare body, a fenced block, or a whole `def` of the target's
/// name (its body is taken). The result is checked to parse as a body.
pub fn normalize(raw: &str, target: &ImplementationTarget) -> Result<String, ImplementerError> {
    let code = strip_fences(raw);
    let mut body = dedent(&code);

    if let Some(inner) = body_of_matching_def(&body, &target.name) {
        body = inner;
    }

    if target.has_docstring {
        body = drop_leading_docstring(&body);
    }

    if body.trim().is_empty() {
        return Err(ImplementerError::Malformed("empty candidate".into()));
    }

    let wrapped = wrap(&body);
    let tree = parse_python(&wrapped)
        .ok_or_else(|| ImplementerError::Malformed("python grammar unavailable".into()))?;
    if tree.root_node().has_error() {
        return Err(ImplementerError::Malformed(
            "candidate is not a valid function body".into(),
        ));
    }

    Ok(body)
}

/// Replacement text for `target.body_span`.
///
/// The span starts at the first stub statement, so the first line carries no
/// indentation of its own, except for inline stubs which move to a new line.
pub fn render(body: &str, target: &ImplementationTarget) -> String {
    let mut out = String::new();

    for (i, line) in body.lines().enumerate() {
        if i == 0 {
            if target.inline {
                out.push('\n');
                out.push_str(&target.indent);
            }
            out.push_str(line);
            continue;
        }

        out.push('\n');
        if !line.trim().is_empty() {
            out.push_str(&target.indent);
            out.push_str(line);
        }
    }

    out
}

/* ============================================================
   Helpers
   ============================================================ */

/// Content of the first fenced block, or the input when there is none.
fn strip_fences(raw: &str) -> String {
    let Some(open) = raw.find("```") else {
        return raw.to_string();
    };

    let after = &raw[open + 3..];
    // Skip the info string (`python`, `py`, ...).
    let content = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => return String::new(),
    };

    match content.find("```") {
        Some(close) => content[..close].to_string(),
        None => content.to_string(),
    }
}

/// Removes common leading indentation and surrounding blank lines.
///
/// Only spaces and tabs count as indentation, so the margin always ends on
/// a char boundary.
fn dedent(code: &str) -> String {
    let lines: Vec<&str> = code.lines().map(|l| l.trim_end()).collect();

    let margin = lines
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let end = lines.iter().rposition(|l| !l.is_empty()).map(|i| i + 1).unwrap_or(start);

    lines[start..end]
        .iter()
        .map(|l| if l.is_empty() { "" } else { &l[margin..] })
        .collect::<Vec<_>>()
        .join("\n")
}

fn wrap(body: &str) -> String {
    let mut out = String::from(WRAPPER);
    for line in body.lines() {
        if !line.trim().is_empty() {
            out.push_str("    ");
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// When the answer is a whole definition named `name`, returns its body.
fn body_of_matching_def(code: &str, name: &str) -> Option<String> {
    let tree = parse_python(code)?;
    let root = tree.root_node();
    if root.has_error() {
        return None;
    }

    let decl = declarations(root)
        .into_iter()
        .find(|d| d.is_function() && d.name(code) == name)?;
    let block = decl.body()?;

    if block.start_position().row == decl.node.start_position().row {
        return Some(code[block.start_byte()..block.end_byte()].to_string());
    }

    let lines: Vec<&str> = code.lines().collect();
    let first = block.start_position().row;
    let last = block.end_position().row.min(lines.len().saturating_sub(1));
    Some(dedent(&lines[first..=last].join("\n")))
}

/// Drops a docstring the stub already carries, if statements follow it.
fn drop_leading_docstring(body: &str) -> String {
    let wrapped = wrap(body);
    let Some(tree) = parse_python(&wrapped) else {
        return body.to_string();
    };
    let Some(block) = declarations(tree.root_node())
        .first()
        .and_then(|d| d.body())
    else {
        return body.to_string();
    };

    let mut cursor = block.walk();
    let statements: Vec<_> = block
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();

    match statements.as_slice() {
        [first, next, ..] if is_docstring(*first) => {
            // Row 0 of the wrapper is the def line.
            let keep_from = next.start_position().row - 1;
            body.lines().skip(keep_from).collect::<Vec<_>>().join("\n")
        }
        _ => body.to_string(),
    }
}

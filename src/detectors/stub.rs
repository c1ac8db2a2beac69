//! detectors/stub.rs
//!
//! Structural stub classification over a function body.
//!
//! A body is a stub only when, after comments and one leading docstring,
//! exactly one statement remains and it matches a recognized shape.

use serde::Serialize;
use tree_sitter::Node;

use crate::detectors::ast::text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StubShape {
    /// `pass` or `...`
    Placeholder,
    /// `raise NotImplementedError[(...)]`
    NotImplemented,
}

impl StubShape {
    pub fn describe(self) -> &'static str {
        match self {
            StubShape::Placeholder => "empty placeholder",
            StubShape::NotImplemented => "raises NotImplementedError",
        }
    }
}

/// Classification of a stub body and the node that must be replaced.
#[derive(Debug, Clone, Copy)]
pub struct StubBody<'t> {
    pub shape: StubShape,
    pub statement: Node<'t>,
    pub has_docstring: bool,
}

/// Classifies the `block` of a function definition.
pub fn classify_body<'t>(block: Node<'t>, source: &str) -> Option<StubBody<'t>> {
    let mut cursor = block.walk();
    let statements: Vec<Node<'t>> = block
        .named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect();

    let (has_docstring, rest) = match statements.split_first() {
        Some((first, rest)) if is_docstring(*first) => (true, rest),
        _ => (false, statements.as_slice()),
    };

    let [statement] = rest else {
        return None;
    };

    let shape = statement_shape(*statement, source)?;

    Some(StubBody {
        shape,
        statement: *statement,
        has_docstring,
    })
}

fn statement_shape(stmt: Node, source: &str) -> Option<StubShape> {
    match stmt.kind() {
        "pass_statement" => Some(StubShape::Placeholder),
        "expression_statement" => {
            let expr = sole_named_child(stmt)?;
            (expr.kind() == "ellipsis").then_some(StubShape::Placeholder)
        }
        "raise_statement" => raises_not_implemented(stmt, source).then_some(StubShape::NotImplemented),
        _ => None,
    }
}

/// The raised expression is the first named child that is not the `from` cause.
fn raises_not_implemented(stmt: Node, source: &str) -> bool {
    let cause = stmt.child_by_field_name("cause").map(|c| c.id());
    let mut cursor = stmt.walk();
    let raised = stmt
        .named_children(&mut cursor)
        .find(|c| Some(c.id()) != cause && c.kind() != "comment");

    let Some(raised) = raised else {
        return false;
    };

    let callee = match raised.kind() {
        "call" => match raised.child_by_field_name("function") {
            Some(f) => f,
            None => return false,
        },
        _ => raised,
    };

    match callee.kind() {
        "identifier" => text(callee, source) == "NotImplementedError",
        "attribute" => callee
            .child_by_field_name("attribute")
            .map(|a| text(a, source) == "NotImplementedError")
            .unwrap_or(false),
        _ => false,
    }
}

pub fn is_docstring(stmt: Node) -> bool {
    stmt.kind() == "expression_statement"
        && sole_named_child(stmt)
            .map(|c| matches!(c.kind(), "string" | "concatenated_string"))
            .unwrap_or(false)
}

fn sole_named_child(node: Node) -> Option<Node> {
    if node.named_child_count() == 1 {
        node.named_child(0)
    } else {
        None
    }
}

/// Decorators that mark a deliberately bodiless function.
pub fn is_intentionally_abstract(decorators: &[&str]) -> bool {
    decorators.iter().any(|d| {
        let last = d.rsplit('.').next().unwrap_or(d);
        matches!(last, "abstractmethod" | "overload")
    })
}

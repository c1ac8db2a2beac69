//! detectors/ast.rs
//!
//! Python parsing helpers shared by the target and test scanners.

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use tree_sitter::{Node, Parser, Tree};

use crate::error::ScanError;

thread_local! {
    static PY_PARSER: RefCell<Option<Parser>> = RefCell::new(make_python_parser());
}

fn make_python_parser() -> Option<Parser> {
    let mut p = Parser::new();
    match p.set_language(&tree_sitter_python::language()) {
        Ok(()) => Some(p),
        Err(e) => {
            tracing::error!(err = %e, "tree-sitter-python grammar rejected");
            None
        }
    }
}

/// Parses Python source. `None` only when the grammar could not be loaded.
pub fn parse_python(source: &str) -> Option<Tree> {
    PY_PARSER.with(|p| p.borrow_mut().as_mut()?.parse(source, None))
}

/// A parsed file that is known to be free of syntax errors.
pub struct ParsedFile {
    pub source: String,
    pub tree: Tree,
}

/// Reads and parses `path`, rejecting files with any ERROR or MISSING node.
pub fn parse_file(path: &Path) -> Result<ParsedFile, ScanError> {
    let source = fs::read_to_string(path).map_err(|source| ScanError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let tree = parse_python(&source).ok_or_else(|| ScanError::NoTree {
        path: path.to_path_buf(),
    })?;

    if let Some(line) = first_error_line(tree.root_node()) {
        return Err(ScanError::Syntax {
            path: path.to_path_buf(),
            line,
        });
    }

    Ok(ParsedFile { source, tree })
}

/// True when `source` parses without syntax errors.
pub fn is_valid_python(source: &str) -> bool {
    parse_python(source)
        .map(|t| !t.root_node().has_error())
        .unwrap_or(false)
}

/// 1-based line of the first ERROR/MISSING node, if any.
pub fn first_error_line(node: Node) -> Option<usize> {
    if !node.has_error() {
        return None;
    }
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(line) = first_error_line(child) {
            return Some(line);
        }
    }

    Some(node.start_position().row + 1)
}

pub fn text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub fn field_text<'a>(node: Node, field: &str, source: &'a str) -> Option<&'a str> {
    node.child_by_field_name(field).map(|n| text(n, source))
}

/* ============================================================
   Declarations
   ============================================================ */

/// A `def` or `class`, unwrapped from any `decorated_definition`.
#[derive(Clone, Copy)]
pub struct Declaration<'t> {
    pub node: Node<'t>,
    /// The decorated wrapper when present, otherwise `node`.
    pub outer: Node<'t>,
}

impl<'t> Declaration<'t> {
    pub fn is_function(&self) -> bool {
        self.node.kind() == "function_definition"
    }

    pub fn is_class(&self) -> bool {
        self.node.kind() == "class_definition"
    }

    pub fn name<'s>(&self, source: &'s str) -> &'s str {
        field_text(self.node, "name", source).unwrap_or("")
    }

    pub fn body(&self) -> Option<Node<'t>> {
        self.node.child_by_field_name("body")
    }

    /// Decorator expressions without the leading `@`.
    pub fn decorators<'s>(&self, source: &'s str) -> Vec<&'s str> {
        if self.outer.kind() != "decorated_definition" {
            return Vec::new();
        }

        let mut cursor = self.outer.walk();
        self.outer
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "decorator")
            .map(|c| text(c, source).trim_start_matches('@').trim())
            .collect()
    }
}

/// Function and class declarations directly inside `block` (a module or a class body).
pub fn declarations(block: Node) -> Vec<Declaration> {
    let mut out = Vec::new();
    let mut cursor = block.walk();

    for child in block.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" => out.push(Declaration {
                node: child,
                outer: child,
            }),
            "decorated_definition" => {
                if let Some(def) = child.child_by_field_name("definition") {
                    out.push(Declaration {
                        node: def,
                        outer: child,
                    });
                }
            }
            _ => {}
        }
    }

    out
}

/// Base class expressions of a class definition, as written.
pub fn class_bases<'s>(class: Node, source: &'s str) -> Vec<&'s str> {
    let Some(args) = class.child_by_field_name("superclasses") else {
        return Vec::new();
    };

    let mut cursor = args.walk();
    args.named_children(&mut cursor)
        .filter(|n| n.kind() != "keyword_argument")
        .map(|n| text(n, source))
        .collect()
}

/// Leading whitespace of the line containing `byte`.
pub fn line_indent(source: &str, byte: usize) -> &str {
    let line_start = source[..byte].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let rest = &source[line_start..];
    let width = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    &rest[..width]
}

//! detectors/targets.rs
//!
//! Target discovery: every fully-stubbed function in the library tree,
//! ordered by file path then source position.

use std::path::{Path, PathBuf};

use tree_sitter::Node;

use crate::detectors::ast::{self, declarations, line_indent, parse_file, ParsedFile};
use crate::detectors::stub::{classify_body, is_intentionally_abstract};
use crate::detectors::walk::{python_files, FileFilter};
use crate::error::ScanError;
use crate::state::{ImplementationTarget, TargetKind};

/// Result of a scan: the items found plus the files that were skipped.
#[derive(Debug)]
pub struct Scan<T> {
    pub items: Vec<T>,
    pub warnings: Vec<ScanError>,
}

impl<T> Default for Scan<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetOptions {
    pub filter: FileFilter,
    /// Bare function names never treated as targets.
    pub skip_functions: Vec<String>,
}

/* ============================================================
   Public entry
   ============================================================ */

pub fn discover_targets(library_root: &Path, opts: &TargetOptions) -> Scan<ImplementationTarget> {
    let mut scan = Scan::default();
    let module_base = module_base(library_root);

    for path in python_files(library_root, &opts.filter) {
        if opts.filter.is_test_file(&path) {
            continue;
        }

        let parsed = match parse_file(&path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(file = %path.display(), err = %e, "skipping unparseable source file");
                scan.warnings.push(e);
                continue;
            }
        };

        let module = module_name(&module_base, &path);
        let before = scan.items.len();
        let ctx = FileContext {
            path: &path,
            parsed: &parsed,
            module: &module,
            opts,
        };
        collect(&ctx, parsed.tree.root_node(), &mut Vec::new(), &mut scan.items);

        let found = scan.items.len() - before;
        if found > 0 {
            tracing::debug!(file = %path.display(), found, "stubs found");
        }
    }

    scan
}

/* ============================================================
   Tree walking
   ============================================================ */

struct FileContext<'a> {
    path: &'a Path,
    parsed: &'a ParsedFile,
    module: &'a str,
    opts: &'a TargetOptions,
}

fn collect(
    ctx: &FileContext,
    block: Node,
    classes: &mut Vec<String>,
    out: &mut Vec<ImplementationTarget>,
) {
    let src = ctx.parsed.source.as_str();

    for decl in declarations(block) {
        let name = decl.name(src).to_string();

        if decl.is_class() {
            if let Some(body) = decl.body() {
                classes.push(name);
                collect(ctx, body, classes, out);
                classes.pop();
            }
            continue;
        }

        if ctx.opts.skip_functions.iter().any(|s| *s == name) {
            continue;
        }
        if is_intentionally_abstract(&decl.decorators(src)) {
            continue;
        }

        let Some(block) = decl.body() else {
            continue;
        };
        let Some(stub) = classify_body(block, src) else {
            continue;
        };

        let statement = stub.statement;
        let def_line = decl.node.start_position().row;
        let inline = statement.start_position().row == def_line;

        let header = src[decl.node.start_byte()..block.start_byte()].trim_end();
        let signature = header.trim_end_matches(':').trim_end().to_string();

        // Inline stubs are replaced from just after the colon so the new
        // body starts on its own line without trailing whitespace.
        let span_start = if inline && !stub.has_docstring {
            decl.node.start_byte() + header.len()
        } else {
            statement.start_byte()
        };
        // Comments after the stub belong to the block but are not replaced.
        let span = span_start..statement.end_byte();

        let indent = if inline {
            format!("{}    ", line_indent(src, decl.node.start_byte()))
        } else {
            line_indent(src, statement.start_byte()).to_string()
        };

        let kind = if classes.is_empty() {
            TargetKind::FreeFunction
        } else {
            TargetKind::Method {
                class: classes.join("."),
            }
        };

        let mut qualified = ctx.module.to_string();
        for c in classes.iter() {
            push_segment(&mut qualified, c);
        }
        push_segment(&mut qualified, &name);

        out.push(ImplementationTarget::new(
            qualified,
            name,
            ctx.module.to_string(),
            ctx.path.to_path_buf(),
            kind,
            stub.shape,
            signature,
            span.clone(),
            def_line + 1..statement.end_position().row + 1,
            src[span].to_string(),
            indent,
            inline,
            stub.has_docstring,
        ));
    }
}

fn push_segment(qualified: &mut String, segment: &str) {
    if !qualified.is_empty() {
        qualified.push('.');
    }
    qualified.push_str(segment);
}

/* ============================================================
   Module naming
   ============================================================ */

/// Directory module paths are computed from: the parent of a package root,
/// or the root itself when it is a plain source directory.
fn module_base(library_root: &Path) -> PathBuf {
    if library_root.join("__init__.py").is_file() {
        library_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| library_root.to_path_buf())
    } else {
        library_root.to_path_buf()
    }
}

pub fn module_name(base: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(base).unwrap_or(file);
    let mut parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    if let Some(last) = parts.pop() {
        let stem = last.strip_suffix(".py").unwrap_or(&last).to_string();
        if stem != "__init__" {
            parts.push(stem);
        }
    }

    parts.join(".")
}

/// Last dotted segment of a module path.
pub fn module_stem(module: &str) -> &str {
    module.rsplit('.').next().unwrap_or(module)
}

/// Source text of the function around a target, for prompts and reports.
pub fn function_text(source: &str, target: &ImplementationTarget) -> Option<String> {
    let tree = ast::parse_python(source)?;
    let start = target.body_span.start;
    let mut node = tree.root_node().descendant_for_byte_range(start, start)?;

    while node.kind() != "function_definition" {
        node = node.parent()?;
    }

    Some(ast::text(node, source).to_string())
}

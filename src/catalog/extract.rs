//! catalog/extract.rs
//!
//! Test catalog construction from a pytest-style test tree.

use std::collections::HashSet;
use std::path::Path;

use tree_sitter::Node;

use crate::catalog::resolve::{associate, SymbolIndex, TestSite};
use crate::catalog::Catalog;
use crate::detectors::ast::{class_bases, declarations, parse_file, text, Declaration};
use crate::detectors::walk::{python_files, FileFilter};
use crate::state::{SourceLocation, TestCase, TestKind};

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub filter: FileFilter,
    pub function_prefix: String,
    pub class_prefix: String,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            filter: FileFilter::default(),
            function_prefix: "test".into(),
            class_prefix: "Test".into(),
        }
    }
}

/* ============================================================
   Public entry
   ============================================================ */

/// Catalogs every test under `test_root`. Ids are pytest node ids relative
/// to `project_root`. Unparseable files are skipped and reported.
pub fn build_catalog(
    test_root: &Path,
    project_root: &Path,
    index: &SymbolIndex,
    opts: &CatalogOptions,
) -> Catalog {
    let mut catalog = Catalog::new(test_root.to_path_buf());

    for path in python_files(test_root, &opts.filter) {
        if !opts.filter.is_test_file(&path) {
            continue;
        }

        let parsed = match parse_file(&path) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(file = %path.display(), err = %e, "skipping unparseable test file");
                catalog.warnings.push(e);
                continue;
            }
        };

        let rel = path.strip_prefix(project_root).unwrap_or(&path);
        let file_id = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let file_stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();

        let mut file = TestFile {
            path: &path,
            file_id: &file_id,
            file_stem,
            source: &parsed.source,
            index,
            opts,
            seen: HashSet::new(),
        };

        let before = catalog.cases.len();
        file.collect(parsed.tree.root_node(), &mut Vec::new(), &mut catalog.cases);
        tracing::debug!(file = %file_id, tests = catalog.cases.len() - before, "catalogued");
    }

    catalog
}

/* ============================================================
   Per-file extraction
   ============================================================ */

struct TestFile<'a> {
    path: &'a Path,
    file_id: &'a str,
    file_stem: &'a str,
    source: &'a str,
    index: &'a SymbolIndex,
    opts: &'a CatalogOptions,
    seen: HashSet<String>,
}

impl TestFile<'_> {
    fn collect(&mut self, block: Node, classes: &mut Vec<String>, out: &mut Vec<TestCase>) {
        for decl in declarations(block) {
            let name = decl.name(self.source).to_string();

            if decl.is_class() {
                if !self.is_test_class(&decl, &name) {
                    continue;
                }
                if let Some(body) = decl.body() {
                    classes.push(name);
                    self.collect(body, classes, out);
                    classes.pop();
                }
                continue;
            }

            if !name.starts_with(&self.opts.function_prefix) {
                continue;
            }

            let class_name = (!classes.is_empty()).then(|| classes.join("::"));
            let mut id = self.file_id.to_string();
            for c in classes.iter() {
                id.push_str("::");
                id.push_str(c);
            }
            id.push_str("::");
            id.push_str(&name);

            if !self.seen.insert(id.clone()) {
                tracing::warn!(test = %id, "duplicate test definition; keeping the first");
                continue;
            }

            let site = TestSite {
                file_stem: self.file_stem,
                class_name: class_name.as_deref(),
                test_name: &name,
            };
            let target = associate(self.index, site, decl.body(), self.source);

            out.push(TestCase {
                id,
                name,
                kind: if classes.is_empty() {
                    TestKind::Function
                } else {
                    TestKind::Method
                },
                class_name,
                target,
                location: SourceLocation {
                    file: self.path.to_path_buf(),
                    line: decl.node.start_position().row + 1,
                },
                source: text(decl.outer, self.source).to_string(),
            });
        }
    }

    /// pytest `Test*` classes and unittest `TestCase` subclasses.
    fn is_test_class(&self, decl: &Declaration, name: &str) -> bool {
        name.starts_with(&self.opts.class_prefix)
            || class_bases(decl.node, self.source)
                .iter()
                .any(|b| *b == "TestCase" || b.ends_with(".TestCase"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::catalog::resolve::KnownSymbol;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn index() -> SymbolIndex {
        let mut idx = SymbolIndex::default();
        idx.insert(KnownSymbol {
            qualified: "lib.ops.mul".into(),
            name: "mul".into(),
            module: "lib.ops".into(),
            class: None,
        });
        idx
    }

    #[test]
    fn extracts_functions_classes_and_nested_classes() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "tests/test_ops.py",
            r#"import unittest

def helper():
    return 1

def test_mul():
    assert mul(2, 3) == 6

class TestOps:
    def test_add(self):
        assert True

    def not_a_test(self):
        pass

    class TestNested:
        def test_deep(self):
            assert True

class Checks(unittest.TestCase):
    def test_legacy(self):
        self.assertTrue(True)

class Helpers:
    def test_ignored(self):
        pass
"#,
        );

        let catalog = build_catalog(&root.join("tests"), root, &index(), &CatalogOptions::default());
        assert!(catalog.warnings.is_empty());

        let ids: Vec<_> = catalog.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "tests/test_ops.py::test_mul",
                "tests/test_ops.py::TestOps::test_add",
                "tests/test_ops.py::TestOps::TestNested::test_deep",
                "tests/test_ops.py::Checks::test_legacy",
            ]
        );

        let mul = &catalog.cases[0];
        assert_eq!(mul.kind, TestKind::Function);
        assert_eq!(mul.target.as_deref(), Some("lib.ops.mul"));
        assert_eq!(mul.location.line, 6);
        assert!(mul.source.starts_with("def test_mul"));

        let deep = &catalog.cases[2];
        assert_eq!(deep.kind, TestKind::Method);
        assert_eq!(deep.class_name.as_deref(), Some("TestOps::TestNested"));
        assert_eq!(deep.target, None);
    }

    #[test]
    fn broken_file_is_skipped_with_one_warning() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "tests/test_a.py", "def test_a():\n    assert True\n");
        write(root, "tests/test_broken.py", "def test_b(:\n    assert True\n");
        write(root, "tests/sub/test_c.py", "def test_c():\n    assert True\n");
        write(root, "tests/helpers.py", "def test_not_collected():\n    pass\n");

        let catalog = build_catalog(&root.join("tests"), root, &SymbolIndex::default(), &CatalogOptions::default());

        assert_eq!(catalog.warnings.len(), 1);
        assert!(catalog.warnings[0].path().ends_with("test_broken.py"));
        let ids: Vec<_> = catalog.cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["tests/sub/test_c.py::test_c", "tests/test_a.py::test_a"]);
    }

    #[test]
    fn redefined_tests_are_catalogued_once() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "test_dup.py", "def test_x():\n    pass\n\ndef test_x():\n    assert 1\n");

        let catalog = build_catalog(root, root, &SymbolIndex::default(), &CatalogOptions::default());

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.cases[0].id, "test_dup.py::test_x");
    }
}

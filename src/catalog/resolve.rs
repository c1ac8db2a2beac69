//! catalog/resolve.rs
//!
//! Best-effort association of a test with the library symbol it exercises.
//! The answer is optional by design of the data model: ambiguity yields `None`.

use std::collections::BTreeMap;

use tree_sitter::Node;

use crate::detectors::ast::text;
use crate::detectors::targets::module_stem;
use crate::state::ImplementationTarget;

/* ============================================================
   Symbol index
   ============================================================ */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownSymbol {
    pub qualified: String,
    pub name: String,
    pub module: String,
    pub class: Option<String>,
}

/// Known library symbols keyed by their bare name.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    by_name: BTreeMap<String, Vec<KnownSymbol>>,
}

impl SymbolIndex {
    pub fn from_targets(targets: &[ImplementationTarget]) -> Self {
        let mut index = Self::default();
        for t in targets {
            index.insert(KnownSymbol {
                qualified: t.qualified_name.clone(),
                name: t.name.clone(),
                module: t.module.clone(),
                class: t.class_name().map(str::to_owned),
            });
        }
        index
    }

    pub fn insert(&mut self, symbol: KnownSymbol) {
        let entry = self.by_name.entry(symbol.name.clone()).or_default();
        if !entry.iter().any(|s| s.qualified == symbol.qualified) {
            entry.push(symbol);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn lookup(&self, name: &str) -> &[KnownSymbol] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/* ============================================================
   Association
   ============================================================ */

/// Where a test lives, used to break ties between same-named symbols.
#[derive(Debug, Clone, Copy)]
pub struct TestSite<'a> {
    /// File stem, e.g. `test_operators`.
    pub file_stem: &'a str,
    pub class_name: Option<&'a str>,
    pub test_name: &'a str,
}

pub fn associate(
    index: &SymbolIndex,
    site: TestSite,
    body: Option<Node>,
    source: &str,
) -> Option<String> {
    if index.is_empty() {
        return None;
    }

    if let Some(found) = by_test_name(index, site.test_name).and_then(|c| disambiguate(c, site)) {
        return Some(found);
    }

    let body = body?;
    callee_names(body, source)
        .into_iter()
        .find_map(|name| disambiguate(index.lookup(name), site))
}

/// `test_mul`, `test_chain_rule1` and `test_sigmoid_grad` name `mul`,
/// `chain_rule` and `sigmoid`. The longest matching symbol name wins.
fn by_test_name<'i>(index: &'i SymbolIndex, test_name: &str) -> Option<&'i [KnownSymbol]> {
    let rest = test_name
        .strip_prefix("test")?
        .trim_start_matches('_')
        .to_ascii_lowercase();
    if rest.is_empty() {
        return None;
    }

    index
        .by_name
        .iter()
        .filter(|(name, _)| {
            let name = name.trim_start_matches('_').to_ascii_lowercase();
            if name.is_empty() {
                return false;
            }
            match rest.strip_prefix(name.as_str()) {
                Some("") => true,
                Some(tail) => tail.starts_with('_') || tail.starts_with(|c: char| c.is_ascii_digit()),
                None => false,
            }
        })
        .max_by_key(|(name, _)| name.len())
        .map(|(_, symbols)| symbols.as_slice())
}

fn disambiguate(candidates: &[KnownSymbol], site: TestSite) -> Option<String> {
    match candidates {
        [] => return None,
        [only] => return Some(only.qualified.clone()),
        _ => {}
    }

    let subject = test_subject(site.file_stem);
    let same_module: Vec<&KnownSymbol> = candidates
        .iter()
        .filter(|c| module_stem(&c.module).eq_ignore_ascii_case(subject))
        .collect();

    if let [only] = same_module.as_slice() {
        return Some(only.qualified.clone());
    }

    let pool: Vec<&KnownSymbol> = if same_module.is_empty() {
        candidates.iter().collect()
    } else {
        same_module
    };

    let class_subject = site
        .class_name
        .map(|c| c.rsplit("::").next().unwrap_or(c))
        .map(|c| c.strip_prefix("Test").unwrap_or(c))?;

    let same_class: Vec<&&KnownSymbol> = pool
        .iter()
        .filter(|s| {
            s.class
                .as_deref()
                .map(|k| k.rsplit('.').next().unwrap_or(k).eq_ignore_ascii_case(class_subject))
                .unwrap_or(false)
        })
        .collect();

    match same_class.as_slice() {
        [only] => Some(only.qualified.clone()),
        _ => None,
    }
}

/// `test_operators` / `operators_test` -> `operators`.
pub fn test_subject(file_stem: &str) -> &str {
    if let Some(rest) = file_stem.strip_prefix("test_") {
        return rest;
    }
    file_stem.strip_suffix("_test").unwrap_or(file_stem)
}

/// Names of called functions and methods, in source order.
fn callee_names<'s>(node: Node, source: &'s str) -> Vec<&'s str> {
    let mut out = Vec::new();
    collect_callees(node, source, &mut out);
    out
}

fn collect_callees<'s>(node: Node, source: &'s str, out: &mut Vec<&'s str>) {
    if node.kind() == "call" {
        if let Some(func) = node.child_by_field_name("function") {
            let name = match func.kind() {
                "identifier" => Some(text(func, source)),
                "attribute" => func.child_by_field_name("attribute").map(|a| text(a, source)),
                _ => None,
            };
            if let Some(name) = name {
                out.push(name);
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_callees(child, source, out);
    }
}

pub mod extract;
pub mod resolve;

use std::path::PathBuf;

use crate::error::ScanError;
use crate::state::TestCase;

pub use extract::{build_catalog, CatalogOptions};
pub use resolve::{SymbolIndex, TestSite};

/// Every test discovered in one build, in file-then-position order.
/// Ids are unique within a build.
#[derive(Debug, Default)]
pub struct Catalog {
    pub root: PathBuf,
    pub cases: Vec<TestCase>,
    pub warnings: Vec<ScanError>,
}

impl Catalog {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cases: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Tests associated with the given qualified symbol.
    pub fn for_target(&self, qualified_name: &str) -> Vec<&TestCase> {
        self.cases
            .iter()
            .filter(|c| c.target.as_deref() == Some(qualified_name))
            .collect()
    }

    /// Tests living in `test_<module>.py` or `<module>_test.py`.
    pub fn for_module(&self, module_stem: &str) -> Vec<&TestCase> {
        self.cases
            .iter()
            .filter(|c| {
                c.location
                    .file
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| resolve::test_subject(s) == module_stem && s != module_stem)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Cases with no association, for reporting.
    pub fn unassociated(&self) -> usize {
        self.cases.iter().filter(|c| c.target.is_none()).count()
    }
}

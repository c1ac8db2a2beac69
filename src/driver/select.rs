//! driver/select.rs
//!
//! Which tests judge a target.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::detectors::targets::module_stem;
use crate::state::{ImplementationTarget, TestCase};

/// What to run when no test is associated with a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    #[default]
    FullSuite,
    SameModule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Tests associated with the target by name.
    Associated,
    /// Tests in the target module's test file.
    SameModule,
    /// The whole test tree.
    FullSuite,
    /// Nothing to run; the catalog is empty.
    Empty,
}

#[derive(Debug)]
pub struct Selection<'c> {
    pub scope: Scope,
    pub cases: Vec<&'c TestCase>,
}

impl<'c> Selection<'c> {
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

pub fn select<'c>(
    catalog: &'c Catalog,
    target: &ImplementationTarget,
    policy: FallbackPolicy,
) -> Selection<'c> {
    if catalog.is_empty() {
        return Selection {
            scope: Scope::Empty,
            cases: Vec::new(),
        };
    }

    let associated = catalog.for_target(&target.qualified_name);
    if !associated.is_empty() {
        return Selection {
            scope: Scope::Associated,
            cases: associated,
        };
    }

    if policy == FallbackPolicy::SameModule {
        let same = catalog.for_module(module_stem(&target.module));
        if !same.is_empty() {
            return Selection {
                scope: Scope::SameModule,
                cases: same,
            };
        }
    }

    Selection {
        scope: Scope::FullSuite,
        cases: catalog.cases.iter().collect(),
    }
}

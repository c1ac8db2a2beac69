pub mod ast;
pub mod stub;
pub mod targets;
pub mod walk;

pub use targets::{discover_targets, Scan, TargetOptions};
pub use walk::FileFilter;

// src/dag/mod.rs

//! Source dependency graph.
//!
//! - [`entry`] defines edge rows, including placeholder targets for files
//!   that have not been observed yet.
//! - [`store`] owns the edge arena and keeps it consistent as sources are
//!   registered, re-analyzed and deleted.
//! - [`query`] answers forward and reverse closure queries.

pub mod entry;
pub mod query;
pub mod store;

pub use entry::{DependencyId, DependencyTarget, SourceFileDependencyEntry};
pub use query::{query_absolute_path_dependencies_recursive, query_dependencies_recursive};
pub use store::DependencyStore;

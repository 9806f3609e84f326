//! sqlsight engine
//!
//! This crate turns resolver output into what code generators consume:
//! - Canonical bind arguments and parameterized SQL
//! - Query result shapes with unique accessor names
//! - File-set compilation with diagnostics and dependency tags
//! - An incremental workspace that re-merges one file at a time

pub mod arguments;
pub mod query_results;
pub mod compiler;
pub mod workspace;

pub use arguments::{to_sqlite_arguments, rewrite_sql, Argument};
pub use query_results::{QueryResults, TableResult, ColumnResult};
pub use compiler::{fingerprint, Compiler, Compilation, CompiledFile, CompiledQuery, Source};
pub use workspace::Workspace;

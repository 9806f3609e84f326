//! SQL parsing and semantic analysis
//!
//! This crate handles:
//! - Parsing SQLite-flavoured sources into a positioned tree
//! - Building and merging symbol tables of declared tables and views
//! - Resolving every statement to the columns it exposes
//! - Validating definitions and data modification statements

pub mod tree;
pub mod parser;
pub mod value;
pub mod symbol_table;
pub mod resolver;
pub mod validation;

pub use parser::{SqlParser, ParseError};
pub use value::{Value, ForeignKey};
pub use symbol_table::{SymbolTable, SymbolTableError, Tag, Dependency, Declaration};
pub use resolver::{Resolver, Node, Response, ResolutionError, BindArgument, ArgumentKind};
pub use validation::Validator;

//! Symbol table of declared tables and views
//!
//! Tables are immutable once built. Every entry carries the [`Tag`] of the
//! source that contributed it, so a changed source can be evicted and
//! re-merged without rebuilding the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tree::{CreateIndex, CreateTable, CreateView, Ident, NodeRef, SqlFile, StmtKind};

/// Opaque identifier of a source (usually its path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Create a new tag
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a resolution consulted
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// Declarations contributed by one source
    Source(Tag),

    /// A name that was not found and may be declared by any future source
    AnySource,
}

/// A declared table or view
#[derive(Debug, Clone)]
pub enum Declaration {
    Table(Arc<CreateTable>),
    View(Arc<CreateView>),
}

impl Declaration {
    /// The declared name
    pub fn name(&self) -> &Ident {
        match self {
            Self::Table(table) => &table.name,
            Self::View(view) => &view.name,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    tag: Tag,
    declaration: Declaration,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    tag: Tag,
    index: Arc<CreateIndex>,
}

/// Name-keyed index of declarations; names compare case-insensitively
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    entries: BTreeMap<String, Entry>,
    indexes: BTreeMap<String, IndexEntry>,
    tags: BTreeMap<Tag, BTreeSet<String>>,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl SymbolTable {
    /// Create an empty symbol table
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the tables, views and indexes one file declares
    ///
    /// A name declared twice in the file keeps its first declaration; the
    /// second is reported.
    pub fn build(file: &SqlFile, tag: &Tag) -> (Self, Vec<SymbolTableError>) {
        let mut table = Self::new();
        let mut errors = Vec::new();

        for stmt in &file.statements {
            let declaration = match &stmt.kind {
                StmtKind::CreateTable(create) => Declaration::Table(create.clone()),
                StmtKind::CreateView(create) => Declaration::View(create.clone()),
                StmtKind::CreateIndex(index) => {
                    let name = key(&index.name.value);
                    if table.indexes.contains_key(&name) {
                        errors.push(SymbolTableError::DuplicateIndex {
                            name: index.name.value.clone(),
                            origin: index.name.node_ref(),
                        });
                    } else {
                        table.indexes.insert(
                            name,
                            IndexEntry {
                                tag: tag.clone(),
                                index: index.clone(),
                            },
                        );
                    }
                    continue;
                }
                _ => continue,
            };

            if let Err(error) = table.insert(tag, declaration) {
                errors.push(error);
            }
        }

        tracing::debug!(
            tag = %tag,
            declarations = table.entries.len(),
            indexes = table.indexes.len(),
            errors = errors.len(),
            "built symbol table"
        );

        (table, errors)
    }

    fn insert(&mut self, tag: &Tag, declaration: Declaration) -> Result<(), SymbolTableError> {
        let name = declaration.name();
        let name_key = key(&name.value);
        if let Some(existing) = self.entries.get(&name_key) {
            return Err(SymbolTableError::DuplicateDeclaration {
                name: name.value.clone(),
                origin: name.node_ref(),
                existing: existing.tag.clone(),
            });
        }

        self.tags.entry(tag.clone()).or_default().insert(name_key.clone());
        self.entries.insert(
            name_key,
            Entry {
                tag: tag.clone(),
                declaration,
            },
        );
        Ok(())
    }

    /// Evict everything tagged `tag`, then add `other`'s declarations under
    /// `tag`
    ///
    /// Fails if `other` declares a name another tag already owns.
    pub fn merge(&self, other: &SymbolTable, tag: &Tag) -> Result<SymbolTable, SymbolTableError> {
        let mut merged = self.evict(tag);

        for entry in other.entries.values() {
            merged.insert(tag, entry.declaration.clone())?;
        }
        for (name, entry) in &other.indexes {
            if let Some(existing) = merged.indexes.get(name) {
                return Err(SymbolTableError::DuplicateDeclaration {
                    name: entry.index.name.value.clone(),
                    origin: entry.index.name.node_ref(),
                    existing: existing.tag.clone(),
                });
            }
            merged.indexes.insert(
                name.clone(),
                IndexEntry {
                    tag: tag.clone(),
                    index: entry.index.clone(),
                },
            );
        }

        tracing::debug!(tag = %tag, declarations = merged.entries.len(), "merged symbol table");
        Ok(merged)
    }

    /// Copy without the declarations tagged `tag`
    pub fn evict(&self, tag: &Tag) -> SymbolTable {
        let mut evicted = self.clone();
        if let Some(names) = evicted.tags.remove(tag) {
            tracing::trace!(tag = %tag, names = names.len(), "evicting declarations");
            for name in names {
                evicted.entries.remove(&name);
            }
        }
        evicted.indexes.retain(|_, entry| &entry.tag != tag);
        evicted
    }

    /// Copy without one declaration (or index) name
    pub fn without(&self, name: &str) -> SymbolTable {
        let name = key(name);
        let mut table = self.clone();
        if let Some(entry) = table.entries.remove(&name) {
            if let Some(names) = table.tags.get_mut(&entry.tag) {
                names.remove(&name);
            }
        }
        table.indexes.remove(&name);
        table
    }

    /// Look up a table or view by name
    pub fn lookup(&self, name: &str) -> Option<(&Tag, &Declaration)> {
        self.entries
            .get(&key(name))
            .map(|entry| (&entry.tag, &entry.declaration))
    }

    /// Look up a table by name
    pub fn table(&self, name: &str) -> Option<&Arc<CreateTable>> {
        match self.lookup(name) {
            Some((_, Declaration::Table(table))) => Some(table),
            _ => None,
        }
    }

    /// Every declared table
    pub fn tables(&self) -> impl Iterator<Item = &Arc<CreateTable>> {
        self.entries.values().filter_map(|entry| match &entry.declaration {
            Declaration::Table(table) => Some(table),
            Declaration::View(_) => None,
        })
    }

    /// Indexes declared on `table`
    pub fn indexes_on<'s>(&'s self, table: &'s str) -> impl Iterator<Item = &'s CreateIndex> + 's {
        self.indexes
            .values()
            .map(|entry| entry.index.as_ref())
            .filter(move |index| index.table.matches(table))
    }

    /// Declared names as written, in name order
    pub fn names(&self) -> Vec<String> {
        self.entries
            .values()
            .map(|entry| entry.declaration.name().value.clone())
            .collect()
    }

    /// Names contributed by `tag`
    pub fn names_for(&self, tag: &Tag) -> Vec<String> {
        self.tags
            .get(tag)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.entries.get(name))
                    .map(|entry| entry.declaration.name().value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Symbol table errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SymbolTableError {
    #[error("Table already defined with name {name} (declared in {existing})")]
    DuplicateDeclaration {
        name: String,
        origin: NodeRef,
        existing: Tag,
    },

    #[error("Index already defined with name {name}")]
    DuplicateIndex { name: String, origin: NodeRef },
}

impl SymbolTableError {
    /// Node of the rejected declaration
    pub fn origin(&self) -> NodeRef {
        match self {
            Self::DuplicateDeclaration { origin, .. } | Self::DuplicateIndex { origin, .. } => *origin,
        }
    }

    /// The clashing name
    pub fn name(&self) -> &str {
        match self {
            Self::DuplicateDeclaration { name, .. } | Self::DuplicateIndex { name, .. } => name,
        }
    }
}

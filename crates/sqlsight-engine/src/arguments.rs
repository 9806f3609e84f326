//! Bind argument canonicalization
//!
//! The resolver reports every bind parameter occurrence in the order it
//! met them. Code generators need one argument per distinct parameter,
//! numbered the way SQLite numbers them, with a name and a type.

use serde::{Deserialize, Serialize};
use sqlsight_core::SqliteType;
use sqlsight_sql::tree::{BindParameter, Span};
use sqlsight_sql::{ArgumentKind, BindArgument};

/// One bind parameter, possibly occurring several times in a statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub kind: ArgumentKind,

    /// Source ranges to rewrite, in text order
    pub ranges: Vec<Span>,

    /// Canonical 1-based index, once canonicalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,

    /// Index written in the source (`?3`); canonical arguments always have one
    pub explicit_index: Option<u32>,

    /// Name written in the source (`:name`, `@name`, `$name`), without prefix
    pub explicit_name: Option<String>,

    /// Accessor name, once canonicalized
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub sqlite_type: SqliteType,
    pub nullable: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_type: Option<String>,

    /// Column the parameter is compared with or stored into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Argument {
    /// Raw argument for one resolved occurrence
    ///
    /// Occurrences in a position nothing types are BLOB and nullable.
    pub fn from_bind(bind: &BindArgument) -> Self {
        let (explicit_index, explicit_name) = match &bind.parameter {
            BindParameter::Anonymous => (None, None),
            BindParameter::Indexed(index) => (Some(*index), None),
            BindParameter::Named { name, .. } => (None, Some(name.clone())),
        };
        let value = bind.value.as_ref();

        Self {
            kind: bind.kind,
            ranges: vec![bind.span()],
            index: None,
            explicit_index,
            explicit_name,
            name: None,
            sqlite_type: value.map_or(SqliteType::Blob, |v| v.sqlite_type),
            nullable: value.map_or(true, |v| v.nullable),
            adapter_type: value.and_then(|v| v.adapter_type.clone()),
            column: value.and_then(|v| v.column_name.clone()),
        }
    }

    fn first_offset(&self) -> usize {
        self.ranges.first().map_or(usize::MAX, |range| range.start)
    }
}

/// Number, merge and name arguments the way SQLite binds them
///
/// Occurrences are visited in text order. One with an explicit index takes
/// it; any other takes one more than the highest index handed out so far.
/// Occurrences sharing an index or a name become one argument covering
/// all their ranges. Running this on its own output changes nothing.
pub fn to_sqlite_arguments(arguments: Vec<Argument>) -> Vec<Argument> {
    let mut occurrences = arguments;
    occurrences.sort_by_key(Argument::first_offset);

    let mut canonical: Vec<Argument> = Vec::new();
    let mut highest = 0u32;

    for occurrence in occurrences {
        let existing = canonical.iter_mut().find(|argument| {
            let same_index = occurrence.explicit_index.is_some() && argument.index == occurrence.explicit_index;
            let same_name = occurrence.explicit_name.is_some() && argument.explicit_name == occurrence.explicit_name;
            same_index || same_name
        });

        match existing {
            Some(argument) => merge(argument, occurrence),
            None => {
                let index = occurrence.explicit_index.unwrap_or(highest + 1);
                highest = highest.max(index);
                canonical.push(Argument {
                    index: Some(index),
                    explicit_index: Some(index),
                    ..occurrence
                });
            }
        }
    }

    let mut names = NameAllocator::default();
    for argument in &mut canonical {
        let base = argument
            .explicit_name
            .clone()
            .or_else(|| argument.column.clone())
            .unwrap_or_else(|| format!("arg{}", argument.index.unwrap_or_default()));
        argument.name = Some(names.allocate(&base));
    }

    canonical
}

/// Fold a later occurrence into the argument it refers to
fn merge(argument: &mut Argument, occurrence: Argument) {
    for range in occurrence.ranges {
        if !argument.ranges.contains(&range) {
            argument.ranges.push(range);
        }
    }
    argument.ranges.sort();

    // The first typed position decides the type
    if argument.column.is_none() && occurrence.column.is_some() {
        argument.sqlite_type = occurrence.sqlite_type;
        argument.nullable = occurrence.nullable;
        argument.adapter_type = occurrence.adapter_type;
        argument.column = occurrence.column;
    }
    if occurrence.kind == ArgumentKind::SetOfValues {
        argument.kind = ArgumentKind::SetOfValues;
    }
}

/// Hands out names, suffixing `_2`, `_3`, ... on collisions
#[derive(Debug, Default)]
pub(crate) struct NameAllocator {
    used: Vec<String>,
}

impl NameAllocator {
    pub(crate) fn is_used(&self, name: &str) -> bool {
        self.used.iter().any(|used| used.eq_ignore_ascii_case(name))
    }

    /// Claim `name` if free
    pub(crate) fn try_claim(&mut self, name: &str) -> bool {
        if self.is_used(name) {
            return false;
        }
        self.used.push(name.to_string());
        true
    }

    /// Claim `base`, or the first free suffixed variant of it
    pub(crate) fn allocate(&mut self, base: &str) -> String {
        if self.try_claim(base) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            if self.try_claim(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Statement text with every argument occurrence replaced by `?N`
///
/// `statement` is the statement's span in `text`; argument ranges are
/// offsets into `text`.
pub fn rewrite_sql(text: &str, statement: Span, arguments: &[Argument]) -> String {
    let mut replacements: Vec<(Span, u32)> = arguments
        .iter()
        .filter_map(|argument| argument.index.map(|index| (argument, index)))
        .flat_map(|(argument, index)| argument.ranges.iter().map(move |range| (*range, index)))
        .filter(|(range, _)| range.start >= statement.start && range.end <= statement.end)
        .collect();
    replacements.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));

    let mut sql = statement.slice(text).to_string();
    for (range, index) in replacements {
        let start = range.start - statement.start;
        let end = range.end - statement.start;
        if sql.is_char_boundary(start) && sql.is_char_boundary(end) && end <= sql.len() {
            sql.replace_range(start..end, &format!("?{}", index));
        }
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(start: usize, parameter: BindParameter, column: Option<&str>) -> Argument {
        let (explicit_index, explicit_name) = match parameter {
            BindParameter::Anonymous => (None, None),
            BindParameter::Indexed(index) => (Some(index), None),
            BindParameter::Named { name, .. } => (None, Some(name)),
        };
        Argument {
            kind: ArgumentKind::SingleValue,
            ranges: vec![Span::new(start, start + 1)],
            index: None,
            explicit_index,
            explicit_name,
            name: None,
            sqlite_type: if column.is_some() { SqliteType::Integer } else { SqliteType::Blob },
            nullable: column.is_none(),
            adapter_type: None,
            column: column.map(str::to_string),
        }
    }

    fn named(name: &str) -> BindParameter {
        BindParameter::Named {
            prefix: ':',
            name: name.to_string(),
        }
    }

    fn summary(arguments: &[Argument]) -> Vec<(Option<u32>, Option<String>, usize)> {
        arguments
            .iter()
            .map(|a| (a.index, a.name.clone(), a.ranges.len()))
            .collect()
    }

    #[test]
    fn anonymous_parameters_count_up() {
        let arguments = to_sqlite_arguments(vec![
            raw(20, BindParameter::Anonymous, None),
            raw(10, BindParameter::Anonymous, Some("id")),
        ]);
        assert_eq!(
            summary(&arguments),
            vec![(Some(1), Some("id".to_string()), 1), (Some(2), Some("arg2".to_string()), 1)]
        );
        assert_eq!(arguments[1].sqlite_type, SqliteType::Blob);
        assert!(arguments[1].nullable);
    }

    #[test]
    fn explicit_indexes_and_names_merge() {
        let arguments = to_sqlite_arguments(vec![
            raw(0, named("id"), Some("id")),
            raw(10, BindParameter::Indexed(5), None),
            raw(20, BindParameter::Anonymous, None),
            raw(30, named("id"), None),
            raw(40, BindParameter::Indexed(5), Some("score")),
        ]);
        assert_eq!(
            summary(&arguments),
            vec![
                (Some(1), Some("id".to_string()), 2),
                (Some(5), Some("score".to_string()), 2),
                (Some(6), Some("arg6".to_string()), 1),
            ]
        );
    }

    #[test]
    fn anonymous_then_explicit_index_refer_to_the_same_parameter() {
        let arguments = to_sqlite_arguments(vec![
            raw(0, BindParameter::Anonymous, Some("a")),
            raw(10, BindParameter::Indexed(1), None),
        ]);
        assert_eq!(summary(&arguments), vec![(Some(1), Some("a".to_string()), 2)]);
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = to_sqlite_arguments(vec![
            raw(0, BindParameter::Anonymous, Some("id")),
            raw(10, BindParameter::Anonymous, Some("id")),
            raw(20, named("name"), None),
            raw(30, BindParameter::Indexed(7), None),
            raw(40, named("name"), Some("name")),
        ]);
        let twice = to_sqlite_arguments(once.clone());
        assert_eq!(once, twice);
        assert_eq!(
            once.iter().map(|a| a.name.clone().unwrap()).collect::<Vec<_>>(),
            vec!["id", "id_2", "name", "arg7"]
        );
    }

    #[test]
    fn rewrite_replaces_every_range() {
        let text = "q: SELECT * FROM t WHERE a = :a AND b = ? OR c = :a;";
        let statement = Span::new(3, text.len() - 1);
        let at = |needle: &str, nth: usize| text.match_indices(needle).nth(nth).map(|(i, _)| i).unwrap();

        let arguments = to_sqlite_arguments(vec![
            Argument {
                ranges: vec![Span::new(at(":a", 0), at(":a", 0) + 2)],
                ..raw(0, named("a"), None)
            },
            Argument {
                ranges: vec![Span::new(at("?", 0), at("?", 0) + 1)],
                ..raw(0, BindParameter::Anonymous, None)
            },
            Argument {
                ranges: vec![Span::new(at(":a", 1), at(":a", 1) + 2)],
                ..raw(0, named("a"), None)
            },
        ]);

        assert_eq!(
            rewrite_sql(text, statement, &arguments),
            "SELECT * FROM t WHERE a = ?1 AND b = ?2 OR c = ?1"
        );
    }
}

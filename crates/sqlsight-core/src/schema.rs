//! Storage types and result column descriptors

use serde::{Deserialize, Serialize};

/// SQLite storage class of a column or expression
///
/// Declared type names map onto these through SQLite's affinity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqliteType {
    /// Signed integer
    Integer,

    /// Floating point
    Real,

    /// Text string
    Text,

    /// Blob of bytes, also the "no affinity" type
    Blob,

    /// The NULL literal
    Null,
}

impl SqliteType {
    /// Map a declared column type name to its storage class
    ///
    /// Follows the SQLite affinity rules in order: `INT` wins over
    /// everything, then the text spellings, then `BLOB` (or no type at all),
    /// then the floating point spellings. Anything left over has NUMERIC
    /// affinity, which is reported as REAL.
    pub fn from_type_name(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::Blob;
        };
        let upper = name.to_ascii_uppercase();

        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Self::Blob
        } else {
            // REAL, FLOA, DOUB and the NUMERIC leftovers
            Self::Real
        }
    }
}

impl std::fmt::Display for SqliteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Real => write!(f, "REAL"),
            Self::Text => write!(f, "TEXT"),
            Self::Blob => write!(f, "BLOB"),
            Self::Null => write!(f, "NULL"),
        }
    }
}

/// One column of a compiled query's result, as handed to code generators
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputColumn {
    /// Unique accessor name within the query
    pub name: String,

    /// Storage class
    pub sqlite_type: SqliteType,

    /// Whether the column may be NULL
    pub nullable: bool,

    /// Target type the column is adapted to, if declared with `AS`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_type: Option<String>,
}

impl OutputColumn {
    /// Create a new output column without an adapter
    pub fn new(name: impl Into<String>, sqlite_type: SqliteType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sqlite_type,
            nullable,
            adapter_type: None,
        }
    }

    /// Set the adapter type
    pub fn with_adapter(mut self, adapter_type: Option<String>) -> Self {
        self.adapter_type = adapter_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_rules() {
        assert_eq!(SqliteType::from_type_name(Some("INTEGER")), SqliteType::Integer);
        assert_eq!(SqliteType::from_type_name(Some("bigint")), SqliteType::Integer);
        assert_eq!(SqliteType::from_type_name(Some("VARCHAR")), SqliteType::Text);
        assert_eq!(SqliteType::from_type_name(Some("TEXT")), SqliteType::Text);
        assert_eq!(SqliteType::from_type_name(Some("BLOB")), SqliteType::Blob);
        assert_eq!(SqliteType::from_type_name(None), SqliteType::Blob);
        assert_eq!(SqliteType::from_type_name(Some("DOUBLE")), SqliteType::Real);
        assert_eq!(SqliteType::from_type_name(Some("NUMERIC")), SqliteType::Real);
        // "FLOATING POINT" contains INT, and INT wins
        assert_eq!(SqliteType::from_type_name(Some("FLOATING POINT")), SqliteType::Integer);
    }

    #[test]
    fn display_and_serialization() {
        assert_eq!(SqliteType::Integer.to_string(), "INTEGER");

        let column = OutputColumn::new("id", SqliteType::Integer, false);
        let json = serde_json::to_string(&column).unwrap();
        assert_eq!(json, r#"{"name":"id","sqlite_type":"INTEGER","nullable":false}"#);
    }
}

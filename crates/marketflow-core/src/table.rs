//! Target table descriptors and load methods

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use crate::value::ColumnType;

/// Check that a table or column name is a plain SQL identifier
pub fn is_valid_identifier(name: &str) -> bool {
    static IDENT: OnceLock<regex::Regex> = OnceLock::new();
    IDENT
        .get_or_init(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
        .is_match(name)
}

/// Quote an identifier for interpolation into SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One column of a target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,

    /// Declared type
    pub column_type: ColumnType,

    /// Part of the primary key
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
        }
    }

    /// Mark as primary key column
    pub fn key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// Name and ordered schema of a table a batch is loaded into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name
    pub name: String,

    /// Ordered columns
    pub columns: Vec<ColumnSpec>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a non-key column
    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSpec::new(name, column_type));
        self
    }

    /// Add a primary key column
    pub fn with_key_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSpec::new(name, column_type).key());
        self
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Get column names in declaration order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of the primary key columns in declaration order
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }
}

/// Conflict policy applied when loading a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMethod {
    /// Append rows, failing on any primary key collision
    Insert,

    /// Insert new keys, replace non-key columns of existing keys
    Upsert,

    /// Replace the whole table contents with the batch
    Overwrite,
}

impl LoadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Upsert => "upsert",
            Self::Overwrite => "overwrite",
        }
    }

    /// Whether the target table must declare a primary key
    pub fn requires_primary_key(&self) -> bool {
        matches!(self, Self::Upsert | Self::Overwrite)
    }
}

impl std::fmt::Display for LoadMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! SQL statement generation
//!
//! Every statement the loader issues is built here so both backends share
//! one rendering of the conflict policies. Identifiers are validated before
//! they reach this module; values are always bound as parameters.

use marketflow_core::{ColumnType, TableDescriptor};
pub use marketflow_core::quote_ident;
use sqlparser::ast::Statement;
use sqlparser::dialect::{PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// SQL dialect of a warehouse backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Column type used in generated DDL
    pub fn column_type(&self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::Text) => "TEXT",
            (Self::Sqlite, ColumnType::Integer) => "INTEGER",
            (Self::Postgres, ColumnType::Integer) => "BIGINT",
            (Self::Sqlite, ColumnType::Float) => "REAL",
            (Self::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (Self::Sqlite, ColumnType::Boolean) => "INTEGER",
            (Self::Postgres, ColumnType::Boolean) => "BOOLEAN",
        }
    }

    /// 1-based positional parameter
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::Sqlite => format!("?{}", position),
            Self::Postgres => format!("${}", position),
        }
    }

    /// Upper bound on bound parameters per statement
    pub fn max_params(&self) -> usize {
        match self {
            Self::Sqlite => 32_766,
            Self::Postgres => 65_535,
        }
    }

    /// Rows that fit in one multi-row VALUES statement
    pub fn rows_per_statement(&self, columns: usize) -> usize {
        (self.max_params() / columns.max(1)).clamp(1, 1_000)
    }
}

/// What to do when an inserted row collides with an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict<'a> {
    /// Let the statement fail
    Fail,

    /// Replace every non-key column from the incoming row
    Update { key: &'a [&'a str] },
}

fn ident_list(names: &[&str]) -> String {
    names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", ")
}

/// CREATE TABLE IF NOT EXISTS from a descriptor
pub fn create_table(table: &TableDescriptor, dialect: Dialect) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), dialect.column_type(c.column_type)))
        .collect();

    let key = table.primary_key();
    if !key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", ident_list(&key)));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.name),
        parts.join(", ")
    )
}

/// Multi-row INSERT with the given conflict policy
pub fn insert(
    table: &str,
    columns: &[&str],
    rows: usize,
    dialect: Dialect,
    on_conflict: OnConflict<'_>,
) -> String {
    let width = columns.len();
    let values = (0..rows)
        .map(|row| {
            let params = (1..=width)
                .map(|col| dialect.placeholder(row * width + col))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", params)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let mut statement = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table),
        ident_list(columns),
        values
    );

    if let OnConflict::Update { key } = on_conflict {
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !key.contains(*c))
            .map(|c| format!("{} = excluded.{}", quote_ident(c), quote_ident(c)))
            .collect();

        statement.push_str(&format!(" ON CONFLICT ({}) DO ", ident_list(key)));
        if updates.is_empty() {
            statement.push_str("NOTHING");
        } else {
            statement.push_str(&format!("UPDATE SET {}", updates.join(", ")));
        }
    }

    statement
}

pub fn delete_all(table: &str) -> String {
    format!("DELETE FROM {}", quote_ident(table))
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}

pub fn create_table_as(table: &str, query: &str) -> String {
    format!("CREATE TABLE {} AS {}", quote_ident(table), query)
}

pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

pub fn select_all(table: &str) -> String {
    format!("SELECT * FROM {}", quote_ident(table))
}

/// Check that a rendered transform is exactly one query statement
pub fn validate_query(sql: &str, dialect: Dialect) -> Result<(), String> {
    let statements = match dialect {
        Dialect::Sqlite => Parser::parse_sql(&SQLiteDialect {}, sql),
        Dialect::Postgres => Parser::parse_sql(&PostgreSqlDialect {}, sql),
    }
    .map_err(|e| format!("SQL parse error: {}", e))?;

    match statements.as_slice() {
        [Statement::Query(_)] => Ok(()),
        [] => Err("no SQL statement found".to_string()),
        [_] => Err("transform must be a single SELECT query".to_string()),
        many => Err(format!("expected one statement, found {}", many.len())),
    }
}

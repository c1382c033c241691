//! SQLite warehouse backend
//!
//! The embedded store used for local pipelines and for tests. SQLite runs
//! DDL inside transactions, so both overwrite loads and materializations
//! are atomic and a failed insert leaves the table untouched.

use marketflow_core::{LoadMethod, Record, RecordBatch, ScalarValue, TableDescriptor};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use crate::adapter::{Warehouse, WarehouseError, WarehouseProvider};
use crate::loader::PreparedLoad;
use crate::sql::{self, Dialect};

/// SQLite-backed warehouse
pub struct SqliteWarehouse {
    connection: Mutex<Connection>,
    location: String,
}

impl SqliteWarehouse {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WarehouseError> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|e| {
            WarehouseError::Connection(format!("failed to open {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Opened SQLite warehouse");
        Ok(Self {
            connection: Mutex::new(connection),
            location: path.display().to_string(),
        })
    }

    /// Private in-memory database
    pub fn in_memory() -> Result<Self, WarehouseError> {
        let connection = Connection::open_in_memory()
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;
        Ok(Self {
            connection: Mutex::new(connection),
            location: ":memory:".to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| WarehouseError::Connection("sqlite connection mutex poisoned".to_string()))?;
        f(&mut guard)
    }

    fn load_prepared(&self, prepared: &PreparedLoad, table: &TableDescriptor) -> Result<u64, WarehouseError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|e| db_error(&prepared.table, e))?;

            tx.execute(&sql::create_table(table, Dialect::Sqlite), [])
                .map_err(|e| db_error(&prepared.table, e))?;

            if prepared.replaces_contents() {
                let removed = tx
                    .execute(&sql::delete_all(&prepared.table), [])
                    .map_err(|e| db_error(&prepared.table, e))?;
                tracing::debug!(table = %prepared.table, removed, "Cleared table for overwrite");
            }

            let mut written = 0u64;
            for (statement, rows) in prepared.statements(Dialect::Sqlite) {
                let values = rows.iter().flatten().map(to_sql_value);
                written += tx
                    .execute(&statement, params_from_iter(values))
                    .map_err(|e| db_error(&prepared.table, e))? as u64;
            }

            tx.commit().map_err(|e| db_error(&prepared.table, e))?;
            Ok(written)
        })
    }
}

#[async_trait::async_trait]
impl Warehouse for SqliteWarehouse {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn test_connection(&self) -> Result<(), WarehouseError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| WarehouseError::Connection(e.to_string()))
        })
    }

    async fn load(
        &self,
        batch: &RecordBatch,
        table: &TableDescriptor,
        method: LoadMethod,
    ) -> Result<u64, WarehouseError> {
        let prepared = PreparedLoad::prepare(batch, table, method)?;
        let written = self.load_prepared(&prepared, table)?;
        tracing::info!(
            table = %prepared.table,
            method = %method,
            rows = prepared.rows.len(),
            written,
            "Loaded batch"
        );
        Ok(written)
    }

    async fn materialize(&self, table: &str, query: &str) -> Result<u64, WarehouseError> {
        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|e| db_error(table, e))?;
            tx.execute(&sql::drop_table(table), [])
                .map_err(|e| db_error(table, e))?;
            tx.execute(&sql::create_table_as(table, query), [])
                .map_err(|e| db_error(table, e))?;
            let count: i64 = tx
                .query_row(&sql::count_rows(table), [], |row| row.get(0))
                .map_err(|e| db_error(table, e))?;
            tx.commit().map_err(|e| db_error(table, e))?;
            Ok(count.max(0) as u64)
        })
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>, WarehouseError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| WarehouseError::Query(e.to_string()))?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

            let rows = stmt
                .query_map([], |row| {
                    (0..columns.len())
                        .map(|i| row.get_ref(i).map(from_sql_value))
                        .collect::<Result<Vec<_>, _>>()
                })
                .map_err(|e| WarehouseError::Query(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let values = row.map_err(|e| WarehouseError::Query(e.to_string()))?;
                records.push(columns.iter().cloned().zip(values).collect());
            }
            Ok(records)
        })
    }

    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError> {
        self.with_connection(|conn| {
            conn.execute(sql, [])
                .map(|n| n as u64)
                .map_err(|e| WarehouseError::Query(e.to_string()))
        })
    }
}

/// Opens a new SQLite session per run
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
}

impl SqliteProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl WarehouseProvider for SqliteProvider {
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError> {
        let warehouse = SqliteWarehouse::open(&self.path)?;
        warehouse.test_connection().await?;
        Ok(Box::new(warehouse))
    }
}

fn db_error(table: &str, err: rusqlite::Error) -> WarehouseError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => WarehouseError::Conflict {
            table: table.to_string(),
            detail: err.to_string(),
        },
        Some(ErrorCode::CannotOpen) | Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            WarehouseError::Connection(err.to_string())
        }
        _ => WarehouseError::Query(err.to_string()),
    }
}

fn to_sql_value(value: &ScalarValue) -> Value {
    match value {
        ScalarValue::Null => Value::Null,
        ScalarValue::Bool(b) => Value::Integer(i64::from(*b)),
        ScalarValue::Int(i) => Value::Integer(*i),
        ScalarValue::Float(f) => Value::Real(*f),
        ScalarValue::Text(s) => Value::Text(s.clone()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> ScalarValue {
    match value {
        ValueRef::Null => ScalarValue::Null,
        ValueRef::Integer(i) => ScalarValue::Int(i),
        ValueRef::Real(f) => ScalarValue::Float(f),
        ValueRef::Text(bytes) => ScalarValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => {
            tracing::warn!("BLOB column returned as NULL");
            ScalarValue::Null
        }
    }
}

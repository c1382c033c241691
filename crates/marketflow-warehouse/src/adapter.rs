//! Warehouse connection trait

use marketflow_core::{LoadMethod, Record, RecordBatch, TableDescriptor};
use std::sync::Arc;
use crate::sql::{self, Dialect};

/// Errors that can occur when talking to a warehouse
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WarehouseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema mismatch for table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("Primary key conflict in table '{table}': {detail}")]
    Conflict { table: String, detail: String },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WarehouseError {
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// A live session against the target relational store
///
/// Implementations own their connection; dropping the value releases it.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync {
    /// Get the backend name (e.g., "SQLite", "PostgreSQL")
    fn name(&self) -> &'static str;

    /// SQL dialect used to render statements for this backend
    fn dialect(&self) -> Dialect;

    /// Test the connection to the warehouse
    async fn test_connection(&self) -> Result<(), WarehouseError>;

    /// Write a batch into a table under a conflict policy
    ///
    /// The table is created from the descriptor when absent. Returns the
    /// number of rows written.
    async fn load(
        &self,
        batch: &RecordBatch,
        table: &TableDescriptor,
        method: LoadMethod,
    ) -> Result<u64, WarehouseError>;

    /// Replace `table` with the result set of `query` in one transaction
    ///
    /// Returns the row count of the new table.
    async fn materialize(&self, table: &str, query: &str) -> Result<u64, WarehouseError>;

    /// Run a query and return its rows
    async fn query(&self, sql: &str) -> Result<Vec<Record>, WarehouseError>;

    /// Execute a statement that returns no rows
    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError>;

    /// Every row of a table
    async fn select_all(&self, table: &str) -> Result<Vec<Record>, WarehouseError> {
        self.query(&sql::select_all(table)).await
    }

    /// Drop a table if it exists
    async fn drop_table(&self, table: &str) -> Result<(), WarehouseError> {
        self.execute(&sql::drop_table(table)).await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl<W: Warehouse + ?Sized> Warehouse for Arc<W> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn dialect(&self) -> Dialect {
        (**self).dialect()
    }

    async fn test_connection(&self) -> Result<(), WarehouseError> {
        (**self).test_connection().await
    }

    async fn load(
        &self,
        batch: &RecordBatch,
        table: &TableDescriptor,
        method: LoadMethod,
    ) -> Result<u64, WarehouseError> {
        (**self).load(batch, table, method).await
    }

    async fn materialize(&self, table: &str, query: &str) -> Result<u64, WarehouseError> {
        (**self).materialize(table, query).await
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>, WarehouseError> {
        (**self).query(sql).await
    }

    async fn execute(&self, sql: &str) -> Result<u64, WarehouseError> {
        (**self).execute(sql).await
    }
}

/// Supplies a warehouse session for one run
#[async_trait::async_trait]
pub trait WarehouseProvider: Send + Sync {
    /// Open a session; the caller releases it by dropping the box
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError>;
}

/// Hands out the same underlying warehouse on every connect
///
/// Useful for in-memory databases that must survive between runs.
#[derive(Clone)]
pub struct StaticProvider {
    warehouse: Arc<dyn Warehouse>,
}

impl StaticProvider {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }
}

#[async_trait::async_trait]
impl WarehouseProvider for StaticProvider {
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError> {
        self.warehouse.test_connection().await?;
        Ok(Box::new(Arc::clone(&self.warehouse)))
    }
}

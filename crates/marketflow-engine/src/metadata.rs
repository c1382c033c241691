//! Run metadata sinks
//!
//! A sink persists one row per run: written once when the run starts and
//! replaced once when it is finalized.

use marketflow_core::{ColumnType, LoadMethod, RecordBatch, RunRecord, ScalarValue, TableDescriptor};
use marketflow_warehouse::{sql, WarehouseProvider};
use std::sync::{Arc, Mutex};
use crate::error::MetadataError;

/// Destination for run records
#[async_trait::async_trait]
pub trait MetadataSink: Send + Sync {
    /// Persist a `Running` record and return its run id
    async fn begin(&self, record: &RunRecord) -> Result<i64, MetadataError>;

    /// Persist the terminal state of a record returned by `begin`
    async fn finalize(&self, record: &RunRecord) -> Result<(), MetadataError>;
}

/// Stores run records in a warehouse table keyed by `(pipeline_name, run_id)`
pub struct WarehouseMetadataSink {
    provider: Arc<dyn WarehouseProvider>,
    table: String,
}

impl WarehouseMetadataSink {
    pub fn new(provider: Arc<dyn WarehouseProvider>, table: impl Into<String>) -> Self {
        Self {
            provider,
            table: table.into(),
        }
    }

    pub fn descriptor(&self) -> TableDescriptor {
        TableDescriptor::new(self.table.clone())
            .with_key_column("pipeline_name", ColumnType::Text)
            .with_key_column("run_id", ColumnType::Integer)
            .with_column("started_at", ColumnType::Text)
            .with_column("ended_at", ColumnType::Text)
            .with_column("status", ColumnType::Text)
            .with_column("config", ColumnType::Text)
            .with_column("logs", ColumnType::Text)
    }

    fn row(record: &RunRecord, run_id: i64) -> Result<RecordBatch, MetadataError> {
        let batch = RecordBatch::new([
            "pipeline_name",
            "run_id",
            "started_at",
            "ended_at",
            "status",
            "config",
            "logs",
        ])
        .and_then(|batch| {
            batch.with_row(vec![
                record.pipeline_name.as_str().into(),
                run_id.into(),
                record.started_at.to_rfc3339().into(),
                record.ended_at.map(|t| t.to_rfc3339()).into(),
                record.status.as_str().into(),
                record.config.as_ref().map(|c| c.to_string()).into(),
                record.logs.as_str().into(),
            ])
        })
        .map_err(|e| MetadataError::InvalidRecord(e.to_string()))?;
        Ok(batch)
    }
}

#[async_trait::async_trait]
impl MetadataSink for WarehouseMetadataSink {
    async fn begin(&self, record: &RunRecord) -> Result<i64, MetadataError> {
        let warehouse = self.provider.connect().await?;
        let table = self.descriptor();

        // An empty upsert creates the table on first use
        let empty = RecordBatch::new(table.column_names())
            .map_err(|e| MetadataError::InvalidRecord(e.to_string()))?;
        warehouse.load(&empty, &table, LoadMethod::Upsert).await?;

        let query = format!(
            "SELECT MAX(run_id) AS last_run_id FROM {} WHERE pipeline_name = '{}'",
            sql::quote_ident(&self.table),
            record.pipeline_name.replace('\'', "''")
        );
        let rows = warehouse.query(&query).await?;
        let last = rows
            .first()
            .and_then(|row| row.get("last_run_id"))
            .and_then(ScalarValue::as_i64)
            .unwrap_or(0);
        let run_id = last + 1;

        warehouse
            .load(&Self::row(record, run_id)?, &table, LoadMethod::Upsert)
            .await?;
        tracing::debug!(pipeline = %record.pipeline_name, run_id, "Recorded run start");
        Ok(run_id)
    }

    async fn finalize(&self, record: &RunRecord) -> Result<(), MetadataError> {
        let run_id = record
            .run_id
            .ok_or_else(|| MetadataError::InvalidRecord("run was never started".to_string()))?;
        if !record.is_finalized() {
            return Err(MetadataError::InvalidRecord(format!(
                "run {} is still {}",
                run_id, record.status
            )));
        }

        let warehouse = self.provider.connect().await?;
        warehouse
            .load(&Self::row(record, run_id)?, &self.descriptor(), LoadMethod::Upsert)
            .await?;
        tracing::debug!(pipeline = %record.pipeline_name, run_id, status = %record.status, "Recorded run end");
        Ok(())
    }
}

/// One write received by [`MemoryMetadataSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataWrite {
    Begin(RunRecord),
    Finalize(RunRecord),
}

/// Keeps every write in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadataSink {
    writes: Arc<Mutex<Vec<MetadataWrite>>>,
}

impl MemoryMetadataSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<MetadataWrite> {
        self.lock().clone()
    }

    /// Records passed to `finalize`, in call order
    pub fn finalized(&self) -> Vec<RunRecord> {
        self.lock()
            .iter()
            .filter_map(|w| match w {
                MetadataWrite::Finalize(record) => Some(record.clone()),
                MetadataWrite::Begin(_) => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetadataWrite>> {
        self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl MetadataSink for MemoryMetadataSink {
    async fn begin(&self, record: &RunRecord) -> Result<i64, MetadataError> {
        let mut writes = self.lock();
        let run_id = writes
            .iter()
            .filter(|w| matches!(w, MetadataWrite::Begin(r) if r.pipeline_name == record.pipeline_name))
            .count() as i64
            + 1;
        let mut stored = record.clone();
        stored.run_id = Some(run_id);
        writes.push(MetadataWrite::Begin(stored));
        Ok(run_id)
    }

    async fn finalize(&self, record: &RunRecord) -> Result<(), MetadataError> {
        let mut writes = self.lock();
        let already = writes.iter().any(|w| {
            matches!(w, MetadataWrite::Finalize(r)
                if r.pipeline_name == record.pipeline_name && r.run_id == record.run_id)
        });
        if already {
            return Err(MetadataError::InvalidRecord(format!(
                "run {:?} of '{}' finalized twice",
                record.run_id, record.pipeline_name
            )));
        }
        writes.push(MetadataWrite::Finalize(record.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketflow_core::RunStatus;
    use marketflow_warehouse::{SqliteWarehouse, StaticProvider, Warehouse};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn warehouse_sink_assigns_increasing_run_ids() {
        let warehouse = Arc::new(SqliteWarehouse::in_memory().unwrap());
        let sink = WarehouseMetadataSink::new(Arc::new(StaticProvider::new(warehouse.clone())), "pipeline_logs");

        let first = RunRecord::start("market_pipeline", Utc::now());
        assert_eq!(sink.begin(&first).await.unwrap(), 1);
        assert_eq!(sink.begin(&first).await.unwrap(), 2);
        let other = RunRecord::start("other_pipeline", Utc::now());
        assert_eq!(sink.begin(&other).await.unwrap(), 1);

        assert_eq!(warehouse.select_all("pipeline_logs").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn warehouse_sink_finalize_replaces_running_row() {
        let warehouse = Arc::new(SqliteWarehouse::in_memory().unwrap());
        let sink = WarehouseMetadataSink::new(Arc::new(StaticProvider::new(warehouse.clone())), "pipeline_logs");

        let mut record = RunRecord::start("market_pipeline", Utc::now())
            .with_config(serde_json::json!({"name": "market_pipeline"}));
        record.run_id = Some(sink.begin(&record).await.unwrap());
        record.finalize(RunStatus::Failure, "line one\nline two", Utc::now()).unwrap();
        sink.finalize(&record).await.unwrap();

        let rows = warehouse.select_all("pipeline_logs").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["status"], ScalarValue::from("failure"));
        assert_eq!(rows[0]["logs"], ScalarValue::from("line one\nline two"));
        assert_eq!(rows[0]["config"], ScalarValue::from(r#"{"name":"market_pipeline"}"#));
        assert!(!rows[0]["ended_at"].is_null());
    }

    #[tokio::test]
    async fn finalize_requires_terminal_record() {
        let sink = WarehouseMetadataSink::new(
            Arc::new(StaticProvider::new(Arc::new(SqliteWarehouse::in_memory().unwrap()))),
            "pipeline_logs",
        );
        let mut record = RunRecord::start("market_pipeline", Utc::now());
        record.run_id = Some(1);
        assert!(matches!(sink.finalize(&record).await, Err(MetadataError::InvalidRecord(_))));
    }

    #[tokio::test]
    async fn memory_sink_rejects_second_finalize() {
        let sink = MemoryMetadataSink::new();
        let mut record = RunRecord::start("market_pipeline", Utc::now());
        record.run_id = Some(sink.begin(&record).await.unwrap());
        record.finalize(RunStatus::Success, "", Utc::now()).unwrap();

        sink.finalize(&record).await.unwrap();
        assert!(sink.finalize(&record).await.is_err());
        assert_eq!(sink.finalized().len(), 1);
    }
}

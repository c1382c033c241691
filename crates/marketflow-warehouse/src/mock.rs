//! In-memory warehouse double that records calls

use marketflow_core::{LoadMethod, Record, RecordBatch, TableDescriptor};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use crate::adapter::{Warehouse, WarehouseError, WarehouseProvider};
use crate::sql::Dialect;

/// A call observed by [`MockWarehouse`]
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseCall {
    Load {
        table: String,
        method: LoadMethod,
        rows: usize,
    },
    Materialize {
        table: String,
        query: String,
    },
}

#[derive(Default)]
struct MockState {
    calls: Vec<WarehouseCall>,
    failing_loads: HashSet<String>,
    failing_materializations: HashSet<String>,
    unreachable: bool,
    query_results: BTreeMap<String, Vec<Record>>,
}

/// Warehouse that keeps a call log and fails on request
///
/// Clones share state, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Clone, Default)]
pub struct MockWarehouse {
    state: Arc<Mutex<MockState>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every load into `table` fail
    pub fn fail_load(&self, table: impl Into<String>) -> &Self {
        self.lock().failing_loads.insert(table.into());
        self
    }

    /// Make materializing `table` fail
    pub fn fail_materialize(&self, table: impl Into<String>) -> &Self {
        self.lock().failing_materializations.insert(table.into());
        self
    }

    /// Make the warehouse unreachable
    pub fn disconnect(&self) -> &Self {
        self.lock().unreachable = true;
        self
    }

    /// Canned rows returned for an exact query text
    pub fn respond(&self, sql: impl Into<String>, rows: Vec<Record>) -> &Self {
        self.lock().query_results.insert(sql.into(), rows);
        self
    }

    pub fn calls(&self) -> Vec<WarehouseCall> {
        self.lock().calls.clone()
    }

    /// Tables materialized so far, in call order
    pub fn materialized(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                WarehouseCall::Materialize { table, .. } => Some(table.clone()),
                WarehouseCall::Load { .. } => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread is the only way to poison this lock
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_reachable(&self) -> Result<(), WarehouseError> {
        if self.lock().unreachable {
            return Err(WarehouseError::Connection("mock warehouse is unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Warehouse for MockWarehouse {
    fn name(&self) -> &'static str {
        "Mock"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn test_connection(&self) -> Result<(), WarehouseError> {
        self.check_reachable()
    }

    async fn load(
        &self,
        batch: &RecordBatch,
        table: &TableDescriptor,
        method: LoadMethod,
    ) -> Result<u64, WarehouseError> {
        self.check_reachable()?;
        let mut state = self.lock();
        state.calls.push(WarehouseCall::Load {
            table: table.name.clone(),
            method,
            rows: batch.len(),
        });
        if state.failing_loads.contains(&table.name) {
            return Err(WarehouseError::Query(format!("load into '{}' failed", table.name)));
        }
        Ok(batch.len() as u64)
    }

    async fn materialize(&self, table: &str, query: &str) -> Result<u64, WarehouseError> {
        self.check_reachable()?;
        let mut state = self.lock();
        state.calls.push(WarehouseCall::Materialize {
            table: table.to_string(),
            query: query.to_string(),
        });
        if state.failing_materializations.contains(table) {
            return Err(WarehouseError::Query(format!("no such table: upstream of {}", table)));
        }
        Ok(0)
    }

    async fn query(&self, sql: &str) -> Result<Vec<Record>, WarehouseError> {
        self.check_reachable()?;
        Ok(self.lock().query_results.get(sql).cloned().unwrap_or_default())
    }

    async fn execute(&self, _sql: &str) -> Result<u64, WarehouseError> {
        self.check_reachable()?;
        Ok(0)
    }
}

#[async_trait::async_trait]
impl WarehouseProvider for MockWarehouse {
    async fn connect(&self) -> Result<Box<dyn Warehouse>, WarehouseError> {
        self.check_reachable()?;
        Ok(Box::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn records_calls_in_order() {
        let mock = MockWarehouse::new();
        mock.materialize("a", "SELECT 1").await.unwrap();
        mock.materialize("b", "SELECT 2").await.unwrap();
        assert_eq!(mock.materialized(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn injected_failures() {
        let mock = MockWarehouse::new();
        mock.fail_materialize("a");
        assert!(mock.materialize("a", "SELECT 1").await.is_err());
        assert_eq!(mock.calls().len(), 1);

        mock.disconnect();
        assert!(matches!(mock.connect().await, Err(WarehouseError::Connection(_))));
    }
}

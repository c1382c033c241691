//! Record batches
//!
//! A batch is an ordered sequence of rows sharing one column set. The
//! column set is fixed when the batch is created and every pushed row is
//! checked against it.

use std::collections::{BTreeMap, HashMap};
use crate::value::ScalarValue;

/// A single row keyed by column name
pub type Record = BTreeMap<String, ScalarValue>;

/// Errors raised while building a batch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchError {
    #[error("Record batch must have at least one column")]
    EmptyColumns,

    #[error("Duplicate column in record batch: {0}")]
    DuplicateColumn(String),

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Row {row} columns {found:?} do not match batch columns {expected:?}")]
    ColumnSetMismatch {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Homogeneous rows destined for one table
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    columns: Vec<String>,
    rows: Vec<Vec<ScalarValue>>,
}

impl RecordBatch {
    /// Create an empty batch with the given column set
    pub fn new<I, S>(columns: I) -> Result<Self, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(BatchError::EmptyColumns);
        }

        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(BatchError::DuplicateColumn(column.clone()));
            }
        }

        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Build a batch from keyed records
    ///
    /// The first record fixes the column set; every other record must carry
    /// exactly the same keys.
    pub fn from_records(records: Vec<Record>) -> Result<Self, BatchError> {
        let first = records.first().ok_or(BatchError::EmptyColumns)?;
        let mut batch = Self::new(first.keys().cloned())?;

        for (index, record) in records.into_iter().enumerate() {
            if record.len() != batch.columns.len()
                || !batch.columns.iter().all(|c| record.contains_key(c))
            {
                return Err(BatchError::ColumnSetMismatch {
                    row: index,
                    expected: batch.columns.clone(),
                    found: record.keys().cloned().collect(),
                });
            }

            let mut record = record;
            let row = batch
                .columns
                .iter()
                .map(|c| record.remove(c).unwrap_or(ScalarValue::Null))
                .collect();
            batch.rows.push(row);
        }

        Ok(batch)
    }

    /// Append a row whose values are in column order
    pub fn push_row(&mut self, values: Vec<ScalarValue>) -> Result<(), BatchError> {
        if values.len() != self.columns.len() {
            return Err(BatchError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.rows.push(values);
        Ok(())
    }

    /// Builder-style variant of `push_row`
    pub fn with_row(mut self, values: Vec<ScalarValue>) -> Result<Self, BatchError> {
        self.push_row(values)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<ScalarValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column in the batch
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Rows as keyed records
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    /// Collapse rows sharing the same key, keeping the last occurrence
    ///
    /// Surviving rows keep the position of the first occurrence of their
    /// key, so the relative order of distinct keys is preserved.
    pub fn dedup_by_key(&self, key: &[&str]) -> Result<Self, BatchError> {
        let indexes = key
            .iter()
            .map(|k| {
                self.column_index(k)
                    .ok_or_else(|| BatchError::UnknownColumn(k.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut positions: HashMap<Vec<String>, usize> = HashMap::new();
        let mut rows: Vec<Vec<ScalarValue>> = Vec::with_capacity(self.rows.len());

        for row in &self.rows {
            let row_key: Vec<String> = indexes.iter().map(|&i| row[i].key_repr()).collect();
            match positions.get(&row_key) {
                Some(&pos) => rows[pos] = row.clone(),
                None => {
                    positions.insert(row_key, rows.len());
                    rows.push(row.clone());
                }
            }
        }

        Ok(Self {
            columns: self.columns.clone(),
            rows,
        })
    }

    /// Whether two or more rows share the same key
    pub fn has_duplicate_keys(&self, key: &[&str]) -> Result<bool, BatchError> {
        Ok(self.dedup_by_key(key)?.len() != self.len())
    }
}

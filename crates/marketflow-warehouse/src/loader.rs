//! Batch preparation shared by the warehouse backends
//!
//! A batch is checked against its table descriptor and coerced to the
//! declared column types before any statement runs, so schema problems are
//! reported without touching the store.

use marketflow_core::{
    is_valid_identifier, ColumnType, LoadMethod, RecordBatch, ScalarValue, TableDescriptor,
};
use crate::adapter::WarehouseError;
use crate::sql::{self, Dialect, OnConflict};

/// A batch ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedLoad {
    pub table: String,
    pub method: LoadMethod,

    /// Every descriptor column, in descriptor order
    pub columns: Vec<String>,

    /// Declared type of each entry in `columns`
    pub column_types: Vec<ColumnType>,

    /// Primary key column names
    pub key: Vec<String>,

    /// Coerced rows, one value per entry in `columns`
    pub rows: Vec<Vec<ScalarValue>>,
}

impl PreparedLoad {
    /// Validate and coerce a batch for loading
    pub fn prepare(
        batch: &RecordBatch,
        table: &TableDescriptor,
        method: LoadMethod,
    ) -> Result<Self, WarehouseError> {
        if !is_valid_identifier(&table.name) {
            return Err(WarehouseError::InvalidIdentifier(table.name.clone()));
        }
        if let Some(column) = table.columns.iter().find(|c| !is_valid_identifier(&c.name)) {
            return Err(WarehouseError::InvalidIdentifier(column.name.clone()));
        }
        if table.columns.is_empty() {
            return Err(mismatch(table, "descriptor declares no columns".to_string()));
        }

        let key: Vec<&str> = table.primary_key();
        if method.requires_primary_key() && key.is_empty() {
            return Err(mismatch(
                table,
                format!("{} requires a primary key", method),
            ));
        }

        let unknown: Vec<&str> = batch
            .columns()
            .iter()
            .map(String::as_str)
            .filter(|c| table.find_column(c).is_none())
            .collect();
        if !unknown.is_empty() {
            return Err(mismatch(
                table,
                format!("columns not in table: {}", unknown.join(", ")),
            ));
        }

        if let Some(missing) = key.iter().find(|k| batch.column_index(k).is_none()) {
            return Err(mismatch(
                table,
                format!("batch is missing key column '{}'", missing),
            ));
        }

        // Upsert and overwrite apply the last row written for a key
        let batch = if method == LoadMethod::Insert || key.is_empty() {
            batch.clone()
        } else {
            batch
                .dedup_by_key(&key)
                .map_err(|e| mismatch(table, e.to_string()))?
        };

        if method == LoadMethod::Insert
            && !key.is_empty()
            && batch
                .has_duplicate_keys(&key)
                .map_err(|e| mismatch(table, e.to_string()))?
        {
            return Err(WarehouseError::Conflict {
                table: table.name.clone(),
                detail: "batch contains duplicate primary key values".to_string(),
            });
        }

        // Every descriptor column is written; columns absent from the batch
        // are null, so an upsert replaces all non-key columns of a matched row
        let specs: Vec<_> = table
            .columns
            .iter()
            .map(|spec| (spec, batch.column_index(&spec.name)))
            .collect();

        let mut rows = Vec::with_capacity(batch.len());
        for (row_number, row) in batch.rows().iter().enumerate() {
            let mut values = Vec::with_capacity(specs.len());
            for (spec, idx) in &specs {
                let Some(idx) = idx else {
                    values.push(ScalarValue::Null);
                    continue;
                };
                let value = &row[*idx];
                if spec.primary_key && value.is_null() {
                    return Err(mismatch(
                        table,
                        format!("row {}: key column '{}' is null", row_number, spec.name),
                    ));
                }
                let coerced = value.coerce_to(spec.column_type).ok_or_else(|| {
                    mismatch(
                        table,
                        format!(
                            "row {}: column '{}' expects {}, got {}",
                            row_number,
                            spec.name,
                            spec.column_type,
                            value.type_name()
                        ),
                    )
                })?;
                values.push(coerced);
            }
            rows.push(values);
        }

        Ok(Self {
            table: table.name.clone(),
            method,
            columns: specs.iter().map(|(spec, _)| spec.name.clone()).collect(),
            column_types: specs.iter().map(|(spec, _)| spec.column_type).collect(),
            key: key.iter().map(|k| k.to_string()).collect(),
            rows,
        })
    }

    /// Whether the table is emptied before inserting
    pub fn replaces_contents(&self) -> bool {
        self.method == LoadMethod::Overwrite
    }

    /// Insert statements, each paired with the rows it binds
    pub fn statements(&self, dialect: Dialect) -> Vec<(String, &[Vec<ScalarValue>])> {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let key: Vec<&str> = self.key.iter().map(String::as_str).collect();
        let on_conflict = match self.method {
            LoadMethod::Upsert => OnConflict::Update { key: &key },
            LoadMethod::Insert | LoadMethod::Overwrite => OnConflict::Fail,
        };

        self.rows
            .chunks(dialect.rows_per_statement(columns.len()))
            .map(|chunk| {
                let statement = sql::insert(&self.table, &columns, chunk.len(), dialect, on_conflict);
                (statement, chunk)
            })
            .collect()
    }
}

fn mismatch(table: &TableDescriptor, detail: String) -> WarehouseError {
    WarehouseError::SchemaMismatch {
        table: table.name.clone(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fx_table() -> TableDescriptor {
        TableDescriptor::new("currency_exchange_rate")
            .with_key_column("date", ColumnType::Text)
            .with_column("base", ColumnType::Text)
            .with_column("rate_usd", ColumnType::Float)
    }

    fn fx_batch(rows: &[(&str, f64)]) -> RecordBatch {
        let mut batch = RecordBatch::new(["date", "base", "rate_usd"]).unwrap();
        for (date, rate) in rows {
            batch
                .push_row(vec![(*date).into(), "EUR".into(), (*rate).into()])
                .unwrap();
        }
        batch
    }

    #[test]
    fn unknown_column_is_schema_mismatch() {
        let batch = RecordBatch::new(["date", "volume"])
            .unwrap()
            .with_row(vec!["2024-05-24".into(), 10i64.into()])
            .unwrap();
        let err = PreparedLoad::prepare(&batch, &fx_table(), LoadMethod::Upsert).unwrap_err();
        assert!(matches!(err, WarehouseError::SchemaMismatch { ref detail, .. } if detail.contains("volume")));
    }

    #[test]
    fn upsert_requires_primary_key() {
        let table = TableDescriptor::new("t").with_column("a", ColumnType::Text);
        let batch = RecordBatch::new(["a"]).unwrap();
        assert!(PreparedLoad::prepare(&batch, &table, LoadMethod::Upsert).is_err());
        assert!(PreparedLoad::prepare(&batch, &table, LoadMethod::Overwrite).is_err());
        assert!(PreparedLoad::prepare(&batch, &table, LoadMethod::Insert).is_ok());
    }

    #[test]
    fn upsert_keeps_last_row_per_key() {
        let batch = fx_batch(&[("2024-05-24", 1.07), ("2024-05-25", 1.09), ("2024-05-24", 1.08)]);
        let prepared = PreparedLoad::prepare(&batch, &fx_table(), LoadMethod::Upsert).unwrap();
        assert_eq!(prepared.rows.len(), 2);
        assert_eq!(prepared.rows[0][2], ScalarValue::Float(1.08));
    }

    #[test]
    fn insert_with_duplicate_keys_conflicts() {
        let batch = fx_batch(&[("2024-05-24", 1.07), ("2024-05-24", 1.08)]);
        let err = PreparedLoad::prepare(&batch, &fx_table(), LoadMethod::Insert).unwrap_err();
        assert!(matches!(err, WarehouseError::Conflict { .. }));
    }

    #[test]
    fn values_are_coerced_to_column_types() {
        let batch = RecordBatch::new(["date", "rate_usd"])
            .unwrap()
            .with_row(vec!["2024-05-24".into(), 1i64.into()])
            .unwrap();
        let prepared = PreparedLoad::prepare(&batch, &fx_table(), LoadMethod::Upsert).unwrap();
        assert_eq!(prepared.columns, vec!["date", "base", "rate_usd"]);
        assert_eq!(prepared.rows[0][2], ScalarValue::Float(1.0));

        let bad = RecordBatch::new(["date", "rate_usd"])
            .unwrap()
            .with_row(vec!["2024-05-24".into(), "high".into()])
            .unwrap();
        assert!(matches!(
            PreparedLoad::prepare(&bad, &fx_table(), LoadMethod::Upsert),
            Err(WarehouseError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn columns_missing_from_batch_are_null() {
        let batch = RecordBatch::new(["rate_usd", "date"])
            .unwrap()
            .with_row(vec![1.08.into(), "2024-05-24".into()])
            .unwrap();
        let prepared = PreparedLoad::prepare(&batch, &fx_table(), LoadMethod::Upsert).unwrap();
        assert_eq!(prepared.columns, vec!["date", "base", "rate_usd"]);
        assert_eq!(
            prepared.rows[0],
            vec!["2024-05-24".into(), ScalarValue::Null, ScalarValue::Float(1.08)]
        );
        let statements = prepared.statements(Dialect::Sqlite);
        assert!(statements[0].0.contains("\"base\" = excluded.\"base\""));
    }

    #[test]
    fn null_key_is_rejected() {
        let batch = RecordBatch::new(["date", "base"])
            .unwrap()
            .with_row(vec![ScalarValue::Null, "EUR".into()])
            .unwrap();
        assert!(PreparedLoad::prepare(&batch, &fx_table(), LoadMethod::Upsert).is_err());
    }

    #[test]
    fn invalid_table_name() {
        let table = TableDescriptor::new("fx; drop table x").with_key_column("date", ColumnType::Text);
        let batch = RecordBatch::new(["date"]).unwrap();
        assert!(matches!(
            PreparedLoad::prepare(&batch, &table, LoadMethod::Insert),
            Err(WarehouseError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn statements_are_chunked() {
        let rows: Vec<(String, f64)> = (0..2_500)
            .map(|i| (format!("day-{}", i), i as f64))
            .collect();
        let refs: Vec<(&str, f64)> = rows.iter().map(|(d, r)| (d.as_str(), *r)).collect();
        let prepared = PreparedLoad::prepare(&fx_batch(&refs), &fx_table(), LoadMethod::Upsert).unwrap();

        let statements = prepared.statements(Dialect::Sqlite);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[2].1.len(), 500);
        assert!(statements[0].0.contains("ON CONFLICT (\"date\") DO UPDATE"));
    }
}

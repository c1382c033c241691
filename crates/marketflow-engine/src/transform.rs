//! Transform nodes
//!
//! A node renders its query template against the pipeline's static
//! parameters and materializes the result set as its output table. The
//! replacement happens in one warehouse transaction, so readers see either
//! the previous table or the new one.

use marketflow_core::is_valid_identifier;
use marketflow_jinja::QueryRenderer;
use marketflow_warehouse::{sql, Warehouse};
use crate::error::TransformError;

/// One named SQL step of the transform graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformNode {
    name: String,
    target_table: String,
    template: String,
}

impl TransformNode {
    pub fn new(
        name: impl Into<String>,
        target_table: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target_table: target_table.into(),
            template: template.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render the query this node would run
    pub fn render(&self, renderer: &QueryRenderer) -> Result<String, TransformError> {
        renderer
            .render(&self.name, &self.template)
            .map_err(|e| TransformError::new(&self.name, e))
    }

    /// Render, validate and materialize; returns the output row count
    pub async fn execute(
        &self,
        renderer: &QueryRenderer,
        warehouse: &dyn Warehouse,
    ) -> Result<u64, TransformError> {
        if !is_valid_identifier(&self.target_table) {
            return Err(TransformError::new(
                &self.name,
                format!("invalid output table name '{}'", self.target_table),
            ));
        }

        let query = self.render(renderer)?;
        sql::validate_query(&query, warehouse.dialect())
            .map_err(|e| TransformError::new(&self.name, e))?;

        tracing::debug!(node = %self.name, table = %self.target_table, "Materializing transform");

        warehouse
            .materialize(&self.target_table, &query)
            .await
            .map_err(|e| TransformError::new(&self.name, e))
    }
}

//! Template rendering context
//!
//! Provides the static parameters visible to every query template.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values available while rendering a transform template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Pipeline name
    pub pipeline: String,

    /// Static variables from the `[vars]` table
    pub vars: BTreeMap<String, serde_json::Value>,

    /// Transform name -> output table, used by `ref()`
    pub tables: BTreeMap<String, String>,
}

impl TemplateContext {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            ..Self::default()
        }
    }

    /// Add a variable
    pub fn add_var(&mut self, key: impl Into<String>, value: serde_json::Value) -> &mut Self {
        self.vars.insert(key.into(), value);
        self
    }

    /// Register the output table of a transform
    pub fn add_table(&mut self, transform: impl Into<String>, table: impl Into<String>) -> &mut Self {
        self.tables.insert(transform.into(), table.into());
        self
    }
}

/// Builder for TemplateContext
pub struct TemplateContextBuilder {
    context: TemplateContext,
}

impl TemplateContextBuilder {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            context: TemplateContext::new(pipeline),
        }
    }

    pub fn var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.add_var(key, value);
        self
    }

    pub fn vars(mut self, vars: BTreeMap<String, serde_json::Value>) -> Self {
        self.context.vars.extend(vars);
        self
    }

    pub fn table(mut self, transform: impl Into<String>, table: impl Into<String>) -> Self {
        self.context.add_table(transform, table);
        self
    }

    pub fn tables(mut self, tables: BTreeMap<String, String>) -> Self {
        self.context.tables.extend(tables);
        self
    }

    pub fn build(self) -> TemplateContext {
        self.context
    }
}

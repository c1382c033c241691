//! Template rendering
//!
//! Converts a transform's Jinja template into the SQL text executed
//! against the warehouse. Undefined variables are errors, so a template can
//! only depend on parameters the pipeline actually declares.

use minijinja::{Environment, UndefinedBehavior};
use std::sync::Arc;
use crate::context::TemplateContext;
use crate::functions;

/// Error during template rendering
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to render template '{template}': {message}")]
    Render { template: String, message: String },

    #[error("Template '{0}' rendered to empty SQL")]
    Empty(String),
}

/// Renders transform templates against one pipeline context
pub struct QueryRenderer {
    env: Environment<'static>,
    context: TemplateContext,
}

impl QueryRenderer {
    /// Create a renderer for the given context
    pub fn new(context: TemplateContext) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.add_function("ref", functions::ref_function(Arc::new(context.tables.clone())));
        env.add_function("source", functions::source_function);
        env.add_function("var", functions::var_function(Arc::new(context.vars.clone())));

        Self { env, context }
    }

    pub fn context(&self) -> &TemplateContext {
        &self.context
    }

    /// Check if SQL contains Jinja templates
    pub fn has_jinja(sql: &str) -> bool {
        sql.contains("{{") || sql.contains("{%") || sql.contains("{#")
    }

    /// Render one template to SQL
    pub fn render(&self, name: &str, template: &str) -> Result<String, RenderError> {
        let rendered = if Self::has_jinja(template) {
            self.env
                .render_str(template, &self.context)
                .map_err(|e| RenderError::Render {
                    template: name.to_string(),
                    message: e.to_string(),
                })?
        } else {
            template.to_string()
        };

        let sql = rendered.trim().trim_end_matches(';').trim().to_string();
        if sql.is_empty() {
            return Err(RenderError::Empty(name.to_string()));
        }
        Ok(sql)
    }
}

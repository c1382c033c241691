//! Engine error types

use marketflow_dag::GraphError;
use marketflow_jinja::TemplateError;
use marketflow_sources::SourceError;
use marketflow_warehouse::WarehouseError;

/// A transform step failed; carries the node name and the underlying cause
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Transform '{node}' failed: {message}")]
pub struct TransformError {
    pub node: String,
    pub message: String,
}

impl TransformError {
    pub fn new(node: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self {
            node: node.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by a metadata sink
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata store error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Invalid run record: {0}")]
    InvalidRecord(String),
}

/// Why a run ended in `Failed`
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to record run start: {0}")]
    Metadata(#[source] MetadataError),

    #[error("Failed to record run end: {0}")]
    Finalize(#[source] MetadataError),

    #[error("Warehouse unavailable: {0}")]
    Connection(#[source] WarehouseError),

    #[error("Extraction of source '{source_name}' failed: {error}")]
    Extract {
        source_name: String,
        #[source]
        error: SourceError,
    },

    #[error("Loading source '{source_name}' into '{table}' failed: {error}")]
    Load {
        source_name: String,
        table: String,
        #[source]
        error: WarehouseError,
    },

    #[error("Invalid transform graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Template lookup failed: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

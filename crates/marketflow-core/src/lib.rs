//! MarketFlow Core
//!
//! Domain model shared by every crate in the workspace: scalar values,
//! record batches, target table descriptors, load methods, run records
//! and the pipeline configuration file.

pub mod value;
pub mod batch;
pub mod table;
pub mod run;
pub mod config;

pub use value::{ScalarValue, ColumnType};
pub use batch::{RecordBatch, Record, BatchError};
pub use table::{TableDescriptor, ColumnSpec, LoadMethod, is_valid_identifier, quote_ident};
pub use run::{RunRecord, RunStatus, RunRecordError};
pub use config::{
    PipelineConfig, ScheduleConfig, LoggingConfig, WarehouseConfig, WarehouseKind,
    MetadataConfig, SourceConfig, SourceKind, TemplateConfig, TransformConfig,
    ConnectionParams, ConfigError,
};

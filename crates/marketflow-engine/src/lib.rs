//! Marketflow engine - run orchestration
//!
//! This crate drives a pipeline run end to end:
//! - Transform nodes and the transform graph
//! - The run state machine and orchestrator
//! - Per-run log text
//! - Metadata sinks for run records

pub mod error;
pub mod transform;
pub mod graph;
pub mod state;
pub mod run_log;
pub mod metadata;
pub mod orchestrator;

pub use error::{MetadataError, RunError, TransformError};
pub use transform::TransformNode;
pub use graph::TransformGraph;
pub use state::RunState;
pub use run_log::RunLog;
pub use metadata::{MemoryMetadataSink, MetadataSink, MetadataWrite, WarehouseMetadataSink};
pub use orchestrator::{RawSource, RunOrchestrator, RunOutcome};

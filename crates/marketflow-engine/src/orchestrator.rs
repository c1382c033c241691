//! Run orchestration
//!
//! A run moves through `Pending -> RawLoading -> Transforming` and ends in
//! `Succeeded` or `Failed`:
//! - the run record is persisted as `Running` before any source is touched
//! - every raw source is fetched and loaded, in declaration order
//! - transforms execute one at a time in dependency order; the first failure
//!   skips the rest
//! - the record is finalized exactly once with the terminal status and the
//!   accumulated log text
//!
//! Errors are values threaded through the phases. `finish` is the single
//! place that turns the outcome into the persisted record.

use chrono::Utc;
use marketflow_core::{LoadMethod, PipelineConfig, RunRecord};
use marketflow_jinja::{QueryRenderer, TemplateContextBuilder, TemplateStore};
use marketflow_sources::{build_source, Source, SourceError};
use marketflow_warehouse::{Warehouse, WarehouseProvider};
use std::sync::Arc;
use crate::error::RunError;
use crate::graph::TransformGraph;
use crate::metadata::MetadataSink;
use crate::run_log::RunLog;
use crate::state::RunState;

/// A raw source and the policy its batches are loaded with
pub struct RawSource {
    pub source: Box<dyn Source>,
    pub method: LoadMethod,
}

/// Result of one run
#[derive(Debug)]
pub struct RunOutcome {
    /// Terminal state
    pub state: RunState,

    /// The run record as last persisted (or as it would have been)
    pub record: RunRecord,

    /// Rows loaded per raw source, in load order
    pub loaded: Vec<(String, u64)>,

    /// Row counts of the executed transforms, in execution order
    pub executed: Vec<(String, u64)>,

    /// Transforms not run because an earlier step failed
    pub skipped: Vec<String>,

    /// Cause of failure
    pub error: Option<RunError>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Succeeded && self.error.is_none()
    }

    /// The finalized record, or the error that failed the run
    pub fn into_result(self) -> Result<RunRecord, RunError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.record),
        }
    }
}

/// Drives pipeline runs against one warehouse and metadata sink
pub struct RunOrchestrator {
    provider: Arc<dyn WarehouseProvider>,
    templates: Arc<dyn TemplateStore>,
    sink: Arc<dyn MetadataSink>,
    sources: Vec<RawSource>,
}

struct Progress {
    state: RunState,
    loaded: Vec<(String, u64)>,
    executed: Vec<(String, u64)>,
    skipped: Vec<String>,
}

impl Progress {
    fn enter(&mut self, next: RunState, log: &mut RunLog) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "Run state transition");
        self.state = next;
        if next == RunState::Transforming {
            log.info("Raw loading complete, starting transforms");
        }
    }
}

impl RunOrchestrator {
    pub fn new(
        provider: Arc<dyn WarehouseProvider>,
        templates: Arc<dyn TemplateStore>,
        sink: Arc<dyn MetadataSink>,
    ) -> Self {
        Self {
            provider,
            templates,
            sink,
            sources: Vec::new(),
        }
    }

    /// Add a raw source
    pub fn with_source(mut self, source: Box<dyn Source>, method: LoadMethod) -> Self {
        self.sources.push(RawSource { source, method });
        self
    }

    /// Add every `[[sources]]` entry of `config`
    ///
    /// `access_key` resolves API keys by environment variable name.
    pub fn with_configured_sources(
        mut self,
        config: &PipelineConfig,
        access_key: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SourceError> {
        for source_config in &config.sources {
            let source = build_source(source_config, &access_key)?;
            self.sources.push(RawSource {
                source,
                method: source_config.load_method,
            });
        }
        Ok(self)
    }

    pub fn sources(&self) -> &[RawSource] {
        &self.sources
    }

    /// Execute one run of `pipeline_name`
    pub async fn run(&self, pipeline_name: &str, config: &PipelineConfig) -> RunOutcome {
        let mut log = match &config.logging.log_folder_path {
            Some(folder) => {
                let folder = config.resolve_path(folder);
                RunLog::with_folder(pipeline_name, &folder).unwrap_or_else(|e| {
                    tracing::warn!(folder = %folder.display(), error = %e, "Cannot open run log file");
                    RunLog::new(pipeline_name)
                })
            }
            None => RunLog::new(pipeline_name),
        };

        let mut record = RunRecord::start(pipeline_name, Utc::now()).with_config(config.to_json());
        let mut progress = Progress {
            state: RunState::Pending,
            loaded: Vec::new(),
            executed: Vec::new(),
            skipped: Vec::new(),
        };

        match self.sink.begin(&record).await {
            Ok(run_id) => record.run_id = Some(run_id),
            Err(e) => {
                let error = RunError::Metadata(e);
                log.error(format!("Pipeline run could not start: {}", error));
                progress.enter(RunState::Failed, &mut log);
                return RunOutcome {
                    state: progress.state,
                    record,
                    loaded: progress.loaded,
                    executed: progress.executed,
                    skipped: progress.skipped,
                    error: Some(error),
                };
            }
        }

        log.info(format!("Starting pipeline run {}", record.run_id.unwrap_or_default()));
        progress.enter(RunState::RawLoading, &mut log);

        let result = self.execute(pipeline_name, config, &mut progress, &mut log).await;
        self.finish(record, progress, log, result).await
    }

    /// Raw loading then transforms; the warehouse session ends on return
    async fn execute(
        &self,
        pipeline_name: &str,
        config: &PipelineConfig,
        progress: &mut Progress,
        log: &mut RunLog,
    ) -> Result<(), RunError> {
        log.info("Connecting to warehouse");
        let warehouse = self.provider.connect().await.map_err(RunError::Connection)?;
        log.info(format!("Connected to {} warehouse", warehouse.name()));

        self.load_raw(warehouse.as_ref(), progress, log).await?;

        progress.enter(RunState::Transforming, log);
        self.run_transforms(pipeline_name, config, warehouse.as_ref(), progress, log).await
    }

    async fn load_raw(
        &self,
        warehouse: &dyn Warehouse,
        progress: &mut Progress,
        log: &mut RunLog,
    ) -> Result<(), RunError> {
        for raw in &self.sources {
            let name = raw.source.name().to_string();
            let table = raw.source.descriptor();

            log.info(format!("Extracting data from source '{}'", name));
            let batch = raw.source.fetch().await.map_err(|error| RunError::Extract {
                source_name: name.clone(),
                error,
            })?;

            log.info(format!(
                "Loading {} rows from '{}' into '{}' ({})",
                batch.len(),
                name,
                table.name,
                raw.method
            ));
            let rows = warehouse
                .load(&batch, &table, raw.method)
                .await
                .map_err(|error| RunError::Load {
                    source_name: name.clone(),
                    table: table.name.clone(),
                    error,
                })?;
            progress.loaded.push((name, rows));
        }
        Ok(())
    }

    async fn run_transforms(
        &self,
        pipeline_name: &str,
        config: &PipelineConfig,
        warehouse: &dyn Warehouse,
        progress: &mut Progress,
        log: &mut RunLog,
    ) -> Result<(), RunError> {
        let graph = TransformGraph::from_config(config, self.templates.as_ref())?;
        let order = graph.execution_order()?;
        log.info(format!(
            "Transform order: {}",
            order.iter().map(|n| n.name()).collect::<Vec<_>>().join(" -> ")
        ));

        let context = TemplateContextBuilder::new(pipeline_name)
            .vars(config.vars.clone())
            .tables(graph.output_tables())
            .build();
        let renderer = QueryRenderer::new(context);

        for (position, node) in order.iter().enumerate() {
            log.info(format!("Running transform '{}'", node.name()));
            match node.execute(&renderer, warehouse).await {
                Ok(rows) => {
                    log.info(format!("Transform '{}' wrote {} rows to '{}'", node.name(), rows, node.target_table()));
                    progress.executed.push((node.name().to_string(), rows));
                }
                Err(e) => {
                    for skipped in &order[position + 1..] {
                        log.warn(format!("Skipping transform '{}'", skipped.name()));
                        progress.skipped.push(skipped.name().to_string());
                    }
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    /// Convert the run result into the terminal state and persist it once
    async fn finish(
        &self,
        mut record: RunRecord,
        mut progress: Progress,
        mut log: RunLog,
        result: Result<(), RunError>,
    ) -> RunOutcome {
        let mut error = match result {
            Ok(()) => {
                log.info("Pipeline run successful");
                progress.enter(RunState::Succeeded, &mut log);
                None
            }
            Err(e) => {
                log.error(format!("Pipeline run failed. See detailed logs: {}", e));
                progress.enter(RunState::Failed, &mut log);
                Some(e)
            }
        };

        match record.finalize(progress.state.record_status(), log.text(), Utc::now()) {
            Ok(()) => {
                if let Err(e) = self.sink.finalize(&record).await {
                    tracing::error!(pipeline = %record.pipeline_name, error = %e, "Failed to record run end");
                    error.get_or_insert(RunError::Finalize(e));
                }
            }
            Err(e) => {
                tracing::error!(pipeline = %record.pipeline_name, error = %e, "Run record already finalized");
            }
        }

        RunOutcome {
            state: progress.state,
            record,
            loaded: progress.loaded,
            executed: progress.executed,
            skipped: progress.skipped,
            error,
        }
    }
}

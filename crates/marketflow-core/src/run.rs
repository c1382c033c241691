//! Run records persisted to the metadata store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = RunRecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(RunRecordError::UnknownStatus(other.to_string())),
        }
    }
}

/// Errors raised by run record transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunRecordError {
    #[error("Run record for '{0}' is already finalized")]
    AlreadyFinalized(String),

    #[error("Cannot finalize a run with non-terminal status '{0}'")]
    NotTerminal(RunStatus),

    #[error("Unknown run status: {0}")]
    UnknownStatus(String),
}

/// One run of a pipeline
///
/// Created with status `Running`, finalized exactly once with a terminal
/// status and the accumulated log text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub pipeline_name: String,

    /// Assigned by the metadata store when the run starts
    pub run_id: Option<i64>,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,

    pub status: RunStatus,

    pub logs: String,

    /// Snapshot of the configuration the run used
    pub config: Option<serde_json::Value>,
}

impl RunRecord {
    /// Start a new run record
    pub fn start(pipeline_name: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            run_id: None,
            started_at,
            ended_at: None,
            status: RunStatus::Running,
            logs: String::new(),
            config: None,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the record to its terminal status
    pub fn finalize(
        &mut self,
        status: RunStatus,
        logs: impl Into<String>,
        ended_at: DateTime<Utc>,
    ) -> Result<(), RunRecordError> {
        if self.is_finalized() {
            return Err(RunRecordError::AlreadyFinalized(self.pipeline_name.clone()));
        }
        if !status.is_terminal() {
            return Err(RunRecordError::NotTerminal(status));
        }

        self.status = status;
        self.logs = logs.into();
        self.ended_at = Some(ended_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_exactly_once() {
        let mut record = RunRecord::start("market_pipeline", Utc::now());
        assert_eq!(record.status, RunStatus::Running);
        assert!(!record.is_finalized());

        record.finalize(RunStatus::Success, "done", Utc::now()).unwrap();
        assert!(record.is_finalized());
        assert_eq!(record.logs, "done");
        assert!(record.ended_at.is_some());

        let err = record.finalize(RunStatus::Failure, "again", Utc::now()).unwrap_err();
        assert_eq!(err, RunRecordError::AlreadyFinalized("market_pipeline".to_string()));
        assert_eq!(record.status, RunStatus::Success);
    }

    #[test]
    fn running_is_not_terminal() {
        let mut record = RunRecord::start("p", Utc::now());
        assert_eq!(
            record.finalize(RunStatus::Running, "", Utc::now()),
            Err(RunRecordError::NotTerminal(RunStatus::Running))
        );
    }

    #[test]
    fn status_parsing() {
        assert_eq!("failure".parse::<RunStatus>().unwrap(), RunStatus::Failure);
        assert!("done".parse::<RunStatus>().is_err());
    }
}

//! Run state machine

use marketflow_core::RunStatus;

/// Phase of a pipeline run
///
/// ```text
/// Pending -> RawLoading -> Transforming -> Succeeded
///                |              |
///                +--> Failed <--+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Pending,
    RawLoading,
    Transforming,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `next` directly follows this state
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::RawLoading)
                | (Self::Pending, Self::Failed)
                | (Self::RawLoading, Self::Transforming)
                | (Self::RawLoading, Self::Failed)
                | (Self::Transforming, Self::Succeeded)
                | (Self::Transforming, Self::Failed)
        )
    }

    /// Status persisted in the run record
    pub fn record_status(&self) -> RunStatus {
        match self {
            Self::Succeeded => RunStatus::Success,
            Self::Failed => RunStatus::Failure,
            Self::Pending | Self::RawLoading | Self::Transforming => RunStatus::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::RawLoading => "raw_loading",
            Self::Transforming => "transforming",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

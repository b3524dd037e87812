//! Run and attempt status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a run as seen through the execution bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run has been started.
    #[default]
    NotStarted,
    /// A run is in flight.
    Running,
    /// The last run completed every stage.
    FinishedSuccess,
    /// The last run ended with an error.
    FinishedError,
    /// The last run was stopped by the caller.
    Cancelled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::FinishedSuccess => write!(f, "finished_success"),
            Self::FinishedError => write!(f, "finished_error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RunState {
    /// Returns true for states a run never leaves.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FinishedSuccess | Self::FinishedError | Self::Cancelled
        )
    }

    /// Returns true if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::FinishedSuccess)
    }
}

/// Outcome of the current attempt of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The attempt has not finished, or the stage was never delegated.
    #[default]
    Pending,
    /// Outputs passed validation.
    Success,
    /// The worker returned but outputs failed validation.
    FailedValidation,
    /// The attempt ended in an error or was cancelled.
    FailedError,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::FailedValidation => write!(f, "failed_validation"),
            Self::FailedError => write!(f, "failed_error"),
        }
    }
}

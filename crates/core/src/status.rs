//! Check conclusions and remote execution states.

use serde::{Deserialize, Serialize};

/// Final, immutable outcome of a check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    /// The stage did what it was asked to.
    Success,
    /// The stage or its remote execution failed.
    Failure,
    /// The remote execution was cancelled.
    Cancelled,
    /// Polling gave up before the execution finished.
    TimedOut,
}

impl Conclusion {
    /// Platform spelling of the conclusion.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one remote execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ExecutionState {
    /// No state reported.
    #[default]
    #[serde(rename = "STATE_UNSPECIFIED")]
    Unspecified,
    /// Accepted but not started.
    #[serde(rename = "STATE_QUEUED")]
    Queued,
    /// Executing.
    #[serde(rename = "STATE_RUNNING")]
    Running,
    /// Finished successfully.
    #[serde(rename = "STATE_SUCCESS")]
    Success,
    /// Finished with a failure.
    #[serde(rename = "STATE_FAILURE")]
    Failure,
    /// Stopped before finishing.
    #[serde(rename = "STATE_CANCELLED")]
    Cancelled,
    /// A state this build does not know yet; polled like a running execution.
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    /// Maps terminal states to a conclusion; `None` while the execution is still going.
    ///
    /// `Unspecified` is a degenerate terminal state and maps to failure.
    pub fn conclusion(self) -> Option<Conclusion> {
        match self {
            Self::Success => Some(Conclusion::Success),
            Self::Failure | Self::Unspecified => Some(Conclusion::Failure),
            Self::Cancelled => Some(Conclusion::Cancelled),
            Self::Queued | Self::Running | Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_map_to_conclusions() {
        assert_eq!(ExecutionState::Success.conclusion(), Some(Conclusion::Success));
        assert_eq!(ExecutionState::Failure.conclusion(), Some(Conclusion::Failure));
        assert_eq!(ExecutionState::Cancelled.conclusion(), Some(Conclusion::Cancelled));
        assert_eq!(ExecutionState::Unspecified.conclusion(), Some(Conclusion::Failure));
        assert_eq!(ExecutionState::Running.conclusion(), None);
        assert_eq!(ExecutionState::Queued.conclusion(), None);
    }

    #[test]
    fn unknown_wire_states_keep_polling() {
        let state: ExecutionState = serde_json::from_str(r#""STATE_PAUSED""#).unwrap();
        assert_eq!(state, ExecutionState::Unknown);
        assert_eq!(state.conclusion(), None);
    }

    #[test]
    fn timed_out_uses_platform_spelling() {
        assert_eq!(Conclusion::TimedOut.to_string(), "timed_out");
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status shared by jobs, batches and contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// Created, not yet picked up
    #[default]
    Pending,
    /// Picked up by its owner and being worked on
    InProgress,
    /// Finished without failures
    Success,
    /// Finished with at least one failure
    Failed,
}

impl ProcessingState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Check if this is an active state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcessingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid processing state: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_check() {
        assert!(ProcessingState::Success.is_terminal());
        assert!(ProcessingState::Failed.is_terminal());
        assert!(!ProcessingState::Pending.is_terminal());
        assert!(!ProcessingState::InProgress.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(ProcessingState::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(
            "FAILED".parse::<ProcessingState>().unwrap(),
            ProcessingState::Failed
        );
        assert!("complete".parse::<ProcessingState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&ProcessingState::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");

        let parsed: ProcessingState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ProcessingState::InProgress);
    }
}

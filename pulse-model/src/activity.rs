use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// The integration trunk branch set.
pub const TRUNK_BRANCHES: [&str; 2] = ["main", "master"];

/// Whether `branch` is part of the integration trunk.
pub fn is_trunk(branch: &str) -> bool {
    TRUNK_BRANCHES.contains(&branch)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestStatus {
    Open,
    Merged,
    Closed,
}

impl PullRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestStatus::Open => "open",
            PullRequestStatus::Merged => "merged",
            PullRequestStatus::Closed => "closed",
        }
    }
}

impl FromStr for PullRequestStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PullRequestStatus::Open),
            "merged" => Ok(PullRequestStatus::Merged),
            "closed" => Ok(PullRequestStatus::Closed),
            other => Err(ModelError::UnknownValue(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trunk_detection_covers_both_names() {
        assert!(is_trunk("main"));
        assert!(is_trunk("master"));
        assert!(!is_trunk("feat-1"));
        assert!(!is_trunk("Main"));
    }

    #[test]
    fn pr_status_round_trips_through_strings() {
        for status in [
            PullRequestStatus::Open,
            PullRequestStatus::Merged,
            PullRequestStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<PullRequestStatus>().unwrap(), status);
        }
    }
}

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::ids::{FeatureId, WorkspaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeaturePriority {
    Low,
    Medium,
    High,
}

impl FeaturePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeaturePriority::Low => "LOW",
            FeaturePriority::Medium => "MEDIUM",
            FeaturePriority::High => "HIGH",
        }
    }
}

impl FromStr for FeaturePriority {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(FeaturePriority::Low),
            "MEDIUM" => Ok(FeaturePriority::Medium),
            "HIGH" => Ok(FeaturePriority::High),
            other => Err(ModelError::UnknownValue(other.to_string())),
        }
    }
}

/// Feature lifecycle state.
///
/// `Complete` is terminal; the pipeline never leaves it. The only in-pipeline
/// transitions are `Active -> Blocked` (an upstream dependency is incomplete)
/// and `Blocked -> Active` (every upstream dependency completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureStatus {
    Active,
    Blocked,
    Complete,
}

impl FeatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureStatus::Active => "ACTIVE",
            FeatureStatus::Blocked => "BLOCKED",
            FeatureStatus::Complete => "COMPLETE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FeatureStatus::Complete)
    }
}

impl FromStr for FeatureStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(FeatureStatus::Active),
            "BLOCKED" => Ok(FeatureStatus::Blocked),
            "COMPLETE" => Ok(FeatureStatus::Complete),
            other => Err(ModelError::UnknownValue(other.to_string())),
        }
    }
}

impl std::fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub priority: FeaturePriority,
    pub status: FeatureStatus,
    pub completion_percentage: i32,
    pub owner_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            FeatureStatus::Active,
            FeatureStatus::Blocked,
            FeatureStatus::Complete,
        ] {
            assert_eq!(status.as_str().parse::<FeatureStatus>().unwrap(), status);
        }
    }

    #[test]
    fn complete_is_terminal() {
        assert!(FeatureStatus::Complete.is_terminal());
        assert!(!FeatureStatus::Active.is_terminal());
        assert!(!FeatureStatus::Blocked.is_terminal());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::WorkspaceId;

/// Tenant boundary tied to exactly one upstream repository by its stable
/// numeric id (rename-safe, unlike the full name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub github_repo_id: i64,
    pub github_repo_name: String,
    pub dashboard_key: String,
    pub activity_window_hours: i32,
    pub health_score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub user_uid: String,
    /// Canonical lowercase username, matched against push commit authors.
    pub username: String,
    pub last_active: Option<DateTime<Utc>>,
}

/// Health tier derived from the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Healthy,
    Warning,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: i32) -> Self {
        if score >= 80 {
            RiskLevel::Healthy
        } else if score >= 50 {
            RiskLevel::Warning
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Healthy => "HEALTHY",
            RiskLevel::Warning => "WARNING",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

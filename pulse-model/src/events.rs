use serde::{Deserialize, Serialize};

use crate::blocker::Severity;
use crate::ids::FeatureId;
use crate::workspace::RiskLevel;

/// Domain events broadcast to dashboard subscribers after the originating
/// transaction has committed. Serialized once per broadcast; the `type` tag
/// and camelCase field names are the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusEvent {
    #[serde(rename = "CONFLICT_WARNING", rename_all = "camelCase")]
    ConflictWarning {
        file: String,
        branches: Vec<String>,
        severity: Severity,
    },
    #[serde(rename = "BLOCKER_CREATED", rename_all = "camelCase")]
    BlockerCreated {
        feature_id: FeatureId,
        feature_name: String,
        blocked_by: Vec<String>,
    },
    #[serde(rename = "HEALTH_UPDATE", rename_all = "camelCase")]
    HealthUpdate { score: i32, risk_level: RiskLevel },
}

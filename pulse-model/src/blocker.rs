use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Conflict severity tier.
///
/// Ordered so that `HIGH > MEDIUM > LOW` compares the way dashboards sort.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            other => Err(ModelError::UnknownValue(other.to_string())),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of the blocker union.
///
/// A blocker's identity is `(workspace, type, reference_id)`, where the
/// reference is polymorphic: a file path for conflict risks, a feature id
/// for dependency blocks, a branch for alignment drift. At most one
/// unresolved blocker exists per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockerType {
    FileConflictRisk,
    DependencyBlock,
    Inactivity,
    AlignmentDrift,
}

impl BlockerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockerType::FileConflictRisk => "FILE_CONFLICT_RISK",
            BlockerType::DependencyBlock => "DEPENDENCY_BLOCK",
            BlockerType::Inactivity => "INACTIVITY",
            BlockerType::AlignmentDrift => "ALIGNMENT_DRIFT",
        }
    }
}

impl FromStr for BlockerType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FILE_CONFLICT_RISK" => Ok(BlockerType::FileConflictRisk),
            "DEPENDENCY_BLOCK" => Ok(BlockerType::DependencyBlock),
            "INACTIVITY" => Ok(BlockerType::Inactivity),
            "ALIGNMENT_DRIFT" => Ok(BlockerType::AlignmentDrift),
            other => Err(ModelError::UnknownValue(other.to_string())),
        }
    }
}

impl std::fmt::Display for BlockerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

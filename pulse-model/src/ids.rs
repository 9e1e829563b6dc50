use uuid::Uuid;

/// Strongly typed ID for workspaces.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Copy,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct WorkspaceId(pub Uuid);

impl Default for WorkspaceId {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkspaceId {
    pub fn new() -> Self {
        WorkspaceId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl AsRef<Uuid> for WorkspaceId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed ID for features.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Copy,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct FeatureId(pub Uuid);

impl Default for FeatureId {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureId {
    pub fn new() -> Self {
        FeatureId(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn to_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed ID for event-bus subscribers.
///
/// Subscriber IDs are ephemeral; they live only as long as the underlying
/// connection and are never persisted.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Copy,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct SubscriberId(pub Uuid);

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberId {
    pub fn new() -> Self {
        SubscriberId(Uuid::now_v7())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

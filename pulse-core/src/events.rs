use async_trait::async_trait;

use pulse_model::{BusEvent, WorkspaceId};

/// Outbound port for post-commit domain events.
///
/// Engines collect events while their transaction is open and publish them
/// through this port strictly after a successful commit. Delivery is
/// best-effort; implementations must not surface errors back into engine
/// control flow.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, workspace_id: WorkspaceId, event: BusEvent);
}

/// Sink that drops every event. Used in tests and in contexts where no
/// subscriber fan-out exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn publish(&self, _workspace_id: WorkspaceId, _event: BusEvent) {}
}

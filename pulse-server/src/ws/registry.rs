use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;

use pulse_core::events::EventSink;
use pulse_model::{BusEvent, SubscriberId, WorkspaceId};

use super::subscriber::Subscriber;

/// Liveness probe cadence. A subscriber that has not answered by the next
/// probe is terminated.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// In-memory registry of dashboard subscribers.
///
/// Two mappings: workspace to subscriber set for broadcast, subscriber to
/// workspace for cleanup. Mutations go through this single owner; broadcast
/// reads tolerate subscribers departing concurrently (a send on a closed
/// channel is a no-op).
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    subscribers: Arc<DashMap<SubscriberId, Arc<Subscriber>>>,
    /// Workspace rooms - maps workspace to subscriber IDs
    rooms: Arc<DashMap<WorkspaceId, Vec<SubscriberId>>>,
    bindings: Arc<DashMap<SubscriberId, WorkspaceId>>,
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscriber_count", &self.subscribers.len())
            .field("room_count", &self.rooms.len())
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and bind it to its workspace.
    pub fn bind(&self, subscriber: Arc<Subscriber>, workspace_id: WorkspaceId) {
        let id = subscriber.id;
        self.subscribers.insert(id, subscriber);
        self.rooms.entry(workspace_id).or_default().push(id);
        self.bindings.insert(id, workspace_id);
    }

    /// Remove a subscriber and clean up room membership.
    pub fn remove(&self, id: SubscriberId) {
        self.subscribers.remove(&id);

        if let Some((_, workspace_id)) = self.bindings.remove(&id) {
            if let Some(mut room) = self.rooms.get_mut(&workspace_id) {
                room.value_mut().retain(|s| s != &id);
            }
            self.rooms.retain(|_, members| !members.is_empty());
        }
    }

    pub fn get(&self, id: &SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.get(id).map(|s| s.clone())
    }

    /// All subscribers currently bound to a workspace.
    pub fn workspace_subscribers(&self, workspace_id: &WorkspaceId) -> Vec<Arc<Subscriber>> {
        self.rooms
            .get(workspace_id)
            .map(|room| {
                room.iter()
                    .filter_map(|id| self.subscribers.get(id).map(|s| s.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Serialize once, deliver to every ready subscriber of the workspace.
    pub fn broadcast(&self, workspace_id: WorkspaceId, event: &BusEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize bus event");
                return;
            }
        };

        for subscriber in self.workspace_subscribers(&workspace_id) {
            if !subscriber.try_send(Message::Text(payload.clone().into())) {
                tracing::warn!(
                    subscriber = %subscriber.id,
                    %workspace_id,
                    "dropped event for unready subscriber"
                );
            }
        }
    }

    /// One liveness sweep: terminate subscribers that missed the previous
    /// probe, ping the rest. Returns how many were terminated.
    pub async fn sweep(&self) -> usize {
        let grace_secs = (PROBE_INTERVAL.as_secs() * 2) as i64;

        let snapshot: Vec<Arc<Subscriber>> = self
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut terminated = 0;
        for subscriber in snapshot {
            if subscriber.is_live(grace_secs).await {
                subscriber.try_send(Message::Ping(Vec::new().into()));
            } else {
                tracing::info!(subscriber = %subscriber.id, "terminating unresponsive subscriber");
                subscriber.close();
                self.remove(subscriber.id);
                terminated += 1;
            }
        }
        terminated
    }

    /// Spawn the background probe loop for the life of the process.
    pub fn spawn_liveness_probe(&self) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROBE_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.sweep().await;
            }
        })
    }
}

#[async_trait]
impl EventSink for SubscriberRegistry {
    async fn publish(&self, workspace_id: WorkspaceId, event: BusEvent) {
        self.broadcast(workspace_id, &event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_model::{RiskLevel, Severity};
    use tokio::sync::mpsc;

    fn subscriber(uid: &str) -> (Arc<Subscriber>, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(16);
        (Arc::new(Subscriber::new(uid, tx)), rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_only_the_bound_workspace() {
        let registry = SubscriberRegistry::new();
        let ws_a = WorkspaceId::new();
        let ws_b = WorkspaceId::new();

        let (sub_a, mut rx_a) = subscriber("alice");
        let (sub_b, mut rx_b) = subscriber("bob");
        registry.bind(sub_a, ws_a);
        registry.bind(sub_b, ws_b);

        registry.broadcast(
            ws_a,
            &BusEvent::HealthUpdate {
                score: 91,
                risk_level: RiskLevel::Healthy,
            },
        );

        let message = rx_a.try_recv().expect("workspace A subscriber got event");
        match message {
            Message::Text(text) => assert!(text.contains("HEALTH_UPDATE")),
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn removed_subscriber_gets_nothing() {
        let registry = SubscriberRegistry::new();
        let ws = WorkspaceId::new();

        let (sub, mut rx) = subscriber("alice");
        let id = sub.id;
        registry.bind(sub, ws);
        registry.remove(id);

        registry.broadcast(
            ws,
            &BusEvent::ConflictWarning {
                file: "a.js".to_string(),
                branches: vec!["feat-1".to_string(), "feat-2".to_string()],
                severity: Severity::High,
            },
        );

        assert!(rx.try_recv().is_err());
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn sweep_pings_live_subscribers() {
        let registry = SubscriberRegistry::new();
        let ws = WorkspaceId::new();

        let (sub, mut rx) = subscriber("alice");
        registry.bind(sub, ws);

        let terminated = registry.sweep().await;
        assert_eq!(terminated, 0);

        match rx.try_recv().expect("ping queued") {
            Message::Ping(_) => {}
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

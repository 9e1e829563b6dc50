use axum::extract::ws::Message;
use std::{fmt, sync::Arc};
use tokio::sync::{RwLock, mpsc};

use pulse_model::SubscriberId;

/// One connected dashboard client.
#[derive(Clone)]
pub struct Subscriber {
    /// Unique subscriber ID
    pub id: SubscriberId,
    /// Dashboard user this connection belongs to
    pub user_uid: Arc<str>,
    /// Channel to send messages to this connection
    sender: mpsc::Sender<Message>,
    /// Last pong timestamp for connection health
    last_pong: Arc<RwLock<i64>>,
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_pong = self.last_pong.try_read().ok().map(|guard| *guard);

        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("user_uid", &self.user_uid)
            .field("channel_closed", &self.sender.is_closed())
            .field("last_pong", &last_pong)
            .finish()
    }
}

impl Subscriber {
    pub fn new(user_uid: &str, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id: SubscriberId::new(),
            user_uid: Arc::from(user_uid),
            sender,
            last_pong: Arc::new(RwLock::new(chrono::Utc::now().timestamp())),
        }
    }

    /// Queue a message for this connection if its channel is ready.
    /// Best-effort: a full or closed channel drops the message.
    pub fn try_send(&self, message: Message) -> bool {
        self.sender.try_send(message).is_ok()
    }

    /// Queue a close frame; the forwarding task delivers it on its way out.
    pub fn close(&self) {
        let _ = self.sender.try_send(Message::Close(None));
    }

    /// Update last pong timestamp
    pub async fn update_pong(&self) {
        *self.last_pong.write().await = chrono::Utc::now().timestamp();
    }

    /// Whether a pong arrived within the grace period. A subscriber that
    /// misses one full probe cycle is considered dead.
    pub async fn is_live(&self, grace_secs: i64) -> bool {
        let last_pong = *self.last_pong.read().await;
        let now = chrono::Utc::now().timestamp();
        now - last_pong < grace_secs
    }
}

//! WebSocket event bus: dashboard clients subscribe per workspace and
//! receive domain events after the originating transaction commits.

mod registry;
mod subscriber;

pub use registry::{PROBE_INTERVAL, SubscriberRegistry};
pub use subscriber::Subscriber;

use std::sync::Arc;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use pulse_core::ingest;
use pulse_model::WorkspaceId;

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userUid")]
    pub user_uid: Option<String>,
}

/// Handle WebSocket upgrade request.
///
/// The subscriber is bound to the workspace owning the `userUid` member row
/// before the upgrade completes; an unknown uid is rejected outright.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> AppResult<Response> {
    let user_uid = params
        .user_uid
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| AppError::bad_request("userUid query parameter is required"))?;

    let mut conn = state.db.pool().acquire().await?;
    let member = ingest::member_by_uid(&mut conn, &user_uid)
        .await?
        .ok_or_else(|| AppError::forbidden("unknown userUid"))?;
    drop(conn);

    let workspace_id = member.workspace_id;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_uid, workspace_id)))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    user_uid: String,
    workspace_id: WorkspaceId,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(100);

    let subscriber = Arc::new(Subscriber::new(&user_uid, tx));
    let subscriber_id = subscriber.id;

    state.registry.bind(subscriber.clone(), workspace_id);
    tracing::info!(subscriber = %subscriber_id, %workspace_id, %user_uid, "subscriber connected");

    // Forward queued messages out; when the registry drops the sender the
    // channel closes and the socket is shut down.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // Inbound loop exists for liveness only; subscribers never send domain
    // messages.
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Pong(_)) | Ok(Message::Ping(_)) => {
                subscriber.update_pong().await;
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                tracing::debug!(subscriber = %subscriber_id, error = %e, "websocket error");
                break;
            }
            Ok(_) => {}
        }
    }

    state.registry.remove(subscriber_id);
    tracing::info!(subscriber = %subscriber_id, %workspace_id, "subscriber disconnected");
}

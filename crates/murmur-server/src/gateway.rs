//! Push gateway: the server side of the WebSocket delivery channel.
//!
//! A client connects with `GET /ws?userId=..&token=..`. After the handshake
//! is authenticated the connection is registered in the presence registry,
//! every connected user is told the new online list, and a writer task
//! drains the channel's event queue into the socket. The reader loop only
//! watches for close, errors and idle timeout; clients send no commands.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use murmur_shared::{ChannelId, ServerEvent, UserId};
use murmur_store::StoreError;

use crate::api::AppState;
use crate::auth::token_from_headers;
use crate::error::ServerError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Authenticate the handshake and resolve the channel's user.
pub fn authenticate_handshake(
    state: &AppState,
    params: &HandshakeParams,
    headers: &HeaderMap,
) -> Result<UserId, ServerError> {
    let claimed = params
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(UserId::from)
        .ok_or_else(|| ServerError::BadRequest("Missing userId".to_string()))?;

    let token = params
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| token_from_headers(headers))
        .ok_or_else(|| ServerError::Unauthenticated("No Token Provided".to_string()))?;

    let user_id = state.sessions.validate(&token)?;
    if user_id != claimed {
        return Err(ServerError::Unauthenticated(
            "Token does not match userId".to_string(),
        ));
    }

    match state.with_db(|db| db.get_user(&user_id)) {
        Ok(_) => Ok(user_id),
        Err(ServerError::Persistence(StoreError::NotFound)) => {
            Err(ServerError::Unauthenticated("User not found".to_string()))
        }
        Err(e) => Err(e),
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ServerError> {
    let user_id = authenticate_handshake(&state, &params, &headers)?;
    let ws = ws.ok_or_else(|| ServerError::BadRequest("Expected WebSocket upgrade".to_string()))?;

    Ok(ws.on_upgrade(move |socket| run_channel(socket, user_id, state)))
}

/// Drive one accepted channel until it closes, then unregister it.
async fn run_channel(socket: WebSocket, user_id: UserId, state: AppState) {
    let channel_id = ChannelId::new();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    state.presence.register(user_id.clone(), channel_id, tx).await;
    state.presence.broadcast_online_users().await;

    let idle_timeout = state.config.channel_idle_timeout;

    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(idle_timeout / 2);
        // The first tick completes immediately.
        ping.tick().await;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    match event.to_json() {
                        Ok(json) => {
                            if sender.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(event = event.name(), error = %e, "Failed to encode event"),
                    }
                }
                _ = ping.tick() => {
                    if sender.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
        debug!(channel = %channel_id, "Channel writer ended");
    });

    info!(user = %user_id, channel = %channel_id, "Delivery channel opened");

    loop {
        match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Err(_) => {
                info!(channel = %channel_id, "Delivery channel idle, closing");
                break;
            }
            Ok(None) | Ok(Some(Ok(WsMessage::Close(_)))) => break,
            Ok(Some(Err(e))) => {
                debug!(channel = %channel_id, error = %e, "Delivery channel error");
                break;
            }
            // Pongs and anything else just keep the channel alive.
            Ok(Some(Ok(_))) => {}
        }
    }

    state.presence.unregister(channel_id).await;
    writer.abort();
    state.presence.broadcast_online_users().await;

    info!(user = %user_id, channel = %channel_id, "Delivery channel closed");
}

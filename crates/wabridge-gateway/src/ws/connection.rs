use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket},
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};
use wabridge_core::config::HEARTBEAT_INTERVAL_SECS;
use wabridge_protocol::{
    AclUpdateMessage, ClientMessage, HelloMessage, ServerMessage, SubscribedMessage,
};

use crate::app::AppState;

/// ACL became empty — client is no longer entitled to any session.
const CLOSE_ACL_EMPTY: u16 = 4403;
/// Connection cap reached at upgrade time.
const CLOSE_CAPACITY: u16 = 4503;
/// Handshake credentials rejected.
const CLOSE_UNAUTHORIZED: u16 = 4401;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "accountId")]
    account_id: String,
    uid: String,
    token: Option<String>,
}

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
///
/// Upgrade path is `/ws?accountId=<aid>&uid=<uid>&token=<bearer>`. `uid` is
/// not part of the platform-facing upgrade path; it stands in for the
/// verified-identity lookup an admin/HTTP layer would otherwise perform
/// before handing a connection to this hub.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if wabridge_protocol::check_token(&state.config.gateway.auth, query.token.as_deref())
        == wabridge_protocol::AuthOutcome::Rejected
    {
        return (axum::http::StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    if !state.try_acquire_connection() {
        return (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "connection limit reached",
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_connection(socket, state, query.account_id, query.uid))
}

/// Per-connection task — lives for the entire WS session lifetime.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, account_id: String, uid: String) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, account_id = %account_id, uid = %uid, "new WS connection");

    let (mut tx, mut rx) = socket.split();

    let mut acl_rx = match state.acl.subscribe(&account_id, &uid) {
        Ok(rx) => rx,
        Err(e) => {
            warn!(conn_id, error = %e, "failed to resolve acl for connection");
            let _ = close_with(&mut tx, CLOSE_UNAUTHORIZED, "acl lookup failed").await;
            state.release_connection();
            return;
        }
    };

    let mut allowed = acl_rx.borrow().sessions.clone();
    if allowed.is_empty() {
        warn!(conn_id, account_id = %account_id, uid = %uid, "no sessions allowed, closing");
        let _ = close_with(&mut tx, CLOSE_ACL_EMPTY, "no sessions allowed").await;
        state.release_connection();
        return;
    }

    let hello = ServerMessage::Hello(HelloMessage::new(conn_id.clone(), allowed.clone()));
    if send_json(&mut tx, &hello).await.is_err() {
        state.release_connection();
        return;
    }

    // client-narrowed subscription; every axis defaults to "no restriction".
    let mut filter = SubscribeFilter::default();

    let mut events = state.sessions.subscribe();

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { sessions, types, chats, from_me }) => {
                                filter = SubscribeFilter {
                                    sessions: sessions.into_iter().filter(|l| allowed.contains(l)).collect(),
                                    types,
                                    chats,
                                    from_me,
                                };
                                let ack = ServerMessage::Subscribed(SubscribedMessage::new(
                                    effective_filter(&filter.sessions, &allowed),
                                    filter.types.clone(),
                                    filter.chats.clone(),
                                    filter.from_me,
                                ));
                                if send_json(&mut tx, &ack).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ClientMessage::Ping) => {
                                awaiting_pong = false;
                            }
                            Err(e) => {
                                warn!(conn_id, error = %e, "malformed client message, ignoring");
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id, error = %e, "ws read error, closing");
                        break;
                    }
                    _ => {}
                }
            }

            changed = acl_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                allowed = acl_rx.borrow().sessions.clone();
                if allowed.is_empty() {
                    let _ = close_with(&mut tx, CLOSE_ACL_EMPTY, "no sessions allowed").await;
                    break;
                }
                filter.sessions.retain(|l| allowed.contains(l));
                let update = ServerMessage::AclUpdate(AclUpdateMessage::new(allowed.clone()));
                if send_json(&mut tx, &update).await.is_err() {
                    break;
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if event.account_id != account_id {
                            continue;
                        }
                        if !filter.matches(&event, &allowed) {
                            continue;
                        }
                        let payload = ServerMessage::Event(event);
                        if send_json(&mut tx, &payload).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(conn_id, skipped, "connection lagged, dropped events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if awaiting_pong {
                    warn!(conn_id, "heartbeat ping unacknowledged, closing connection");
                    break;
                }
                awaiting_pong = true;
                if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.release_connection();
    info!(conn_id, "WS connection closed");
}

fn effective_filter(filter: &[String], allowed: &[String]) -> Vec<String> {
    if filter.is_empty() {
        allowed.to_vec()
    } else {
        filter.to_vec()
    }
}

/// A connection's client-narrowed subscription. Every axis defaults to "no
/// restriction" (empty list / `None`); a present axis narrows conjunctively
/// and never widens past what `allowed` (the ACL'd session set) permits.
#[derive(Debug, Clone, Default)]
struct SubscribeFilter {
    sessions: Vec<String>,
    types: Vec<String>,
    chats: Vec<String>,
    from_me: Option<bool>,
}

impl SubscribeFilter {
    fn matches(&self, event: &wabridge_core::Event, allowed: &[String]) -> bool {
        let sessions = effective_filter(&self.sessions, allowed);
        if !sessions.contains(&event.session_id) {
            return false;
        }
        if !self.types.is_empty() && !self.types.iter().any(|t| t == event.kind.type_str()) {
            return false;
        }
        if !self.chats.is_empty() {
            match event.kind.chat_id() {
                Some(id) if self.chats.iter().any(|c| c == id.as_str()) => {}
                _ => return false,
            }
        }
        if let Some(want) = self.from_me {
            if event.kind.from_me() != Some(want) {
                return false;
            }
        }
        true
    }
}

async fn close_with(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    tx.send(Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    })))
    .await
}

async fn send_json<T: serde::Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}

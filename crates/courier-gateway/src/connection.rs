use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use courier_types::events::{GatewayCommand, GatewayEvent};

use crate::handle::{ConnectionHandle, Outbound};
use crate::presence::Presence;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handshake metadata, taken from the upgrade request's query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub user_id: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("handshake carries no user identity")]
    MissingIdentity,
    #[error("malformed user identity '{0}'")]
    MalformedIdentity(String),
}

/// Resolve the identity a connection wants to bind as.
pub fn admit(handshake: &Handshake) -> Result<Uuid, AdmissionError> {
    let raw = handshake
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AdmissionError::MissingIdentity)?;

    raw.parse()
        .map_err(|_| AdmissionError::MalformedIdentity(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Bound,
    Closed,
}

/// Drive one upgraded socket through CONNECTING -> BOUND -> CLOSED.
///
/// A handshake without a usable identity is closed straight away and never
/// touches the registry.
pub async fn handle_connection(socket: WebSocket, presence: Presence, handshake: Handshake) {
    let mut state = ConnectionState::Connecting;

    let user_id = match admit(&handshake) {
        Ok(user_id) => user_id,
        Err(e) => {
            warn!("rejecting connection: {}", e);
            reject(socket, &e).await;
            return;
        }
    };

    let (mut sender, receiver) = socket.split();
    let (handle, outbound_rx) = ConnectionHandle::new();
    let conn_id = handle.id();

    if presence.bind(user_id, handle).is_some() {
        info!("{} reconnected, superseding previous connection", user_id);
    }
    transition(&mut state, ConnectionState::Bound, user_id, conn_id);

    let ready = GatewayEvent::Ready { user_id };
    if send_event(&mut sender, &ready).await.is_ok() {
        run_connection_loop(sender, receiver, outbound_rx, presence.clone(), user_id).await;
    }

    presence.unbind(user_id, conn_id);
    transition(&mut state, ConnectionState::Closed, user_id, conn_id);
}

fn transition(state: &mut ConnectionState, next: ConnectionState, user_id: Uuid, conn_id: Uuid) {
    info!("{} [{}] {:?} -> {:?}", user_id, conn_id, state, next);
    *state = next;
}

async fn reject(mut socket: WebSocket, reason: &AdmissionError) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: reason.to_string().into(),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).map_err(|e| {
        error!("failed to encode gateway event: {}", e);
        axum::Error::new(e)
    })?;
    sender.send(Message::Text(text.into())).await
}

/// Pump outbound events to the socket and inbound commands to the registry
/// until either side stops, the heartbeat times out, or the registry drops
/// this connection's handle.
async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    presence: Presence,
    user_id: Uuid,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbound_rx.recv() => {
                    // None: registry replaced or dropped this handle
                    let Some(Outbound { event, ack }) = result else {
                        debug!("{} outbound queue closed", user_id);
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };

                    let written = send_event(&mut sender, &event).await.is_ok();
                    let _ = ack.send(written);
                    if !written {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&presence, user_id, cmd),
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{} bad command: {} -- raw: {}", user_id, e, raw);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

fn handle_command(presence: &Presence, user_id: Uuid, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::Subscribe(subscription) => {
            info!("{} registered push subscription", user_id);
            presence.register_subscription(user_id, subscription);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::push::{PushKeys, PushSubscription};

    fn handshake(user_id: Option<&str>) -> Handshake {
        Handshake {
            user_id: user_id.map(str::to_string),
        }
    }

    #[test]
    fn admit_accepts_uuid_identity() {
        let id = Uuid::new_v4();
        assert_eq!(admit(&handshake(Some(&id.to_string()))), Ok(id));
        assert_eq!(admit(&handshake(Some(&format!(" {} ", id)))), Ok(id));
    }

    #[test]
    fn admit_rejects_missing_identity() {
        assert_eq!(admit(&handshake(None)), Err(AdmissionError::MissingIdentity));
        assert_eq!(admit(&handshake(Some("  "))), Err(AdmissionError::MissingIdentity));
    }

    #[test]
    fn admit_rejects_malformed_identity() {
        assert_eq!(
            admit(&handshake(Some("alice"))),
            Err(AdmissionError::MalformedIdentity("alice".into()))
        );
    }

    #[test]
    fn subscribe_command_registers_without_binding() {
        let presence = Presence::new();
        let user = Uuid::new_v4();
        let subscription = PushSubscription {
            endpoint: "https://push.example/1".into(),
            keys: PushKeys {
                p256dh: "p".into(),
                auth: "a".into(),
            },
        };

        handle_command(&presence, user, GatewayCommand::Subscribe(subscription.clone()));

        assert_eq!(presence.subscription(user), Some(subscription));
        assert!(presence.connection(user).is_none());
    }
}

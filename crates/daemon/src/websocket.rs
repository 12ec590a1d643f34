//! Operator WebSocket sessions
//!
//! Each session gets a hub queue drained by its own forwarding task, while
//! the connection's read loop feeds commands to the router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use gateway_types::{GatewayEvent, LinkStatus, OperatorCommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::AppState;

/// Run one session to completion.
pub async fn handle_session(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let id = Uuid::new_v4();
    let events = state
        .hub
        .subscribe(id, peer.to_string(), state.session_buffer)
        .await;
    let active = state.lifecycle.connect().await;
    info!(%id, %peer, active, "Operator connected");

    // Tell the operator where the rover link stands, up or down
    let link = if state.rover.is_connected() {
        LinkStatus::Connected
    } else {
        LinkStatus::Disconnected
    };
    state.hub.publish(GatewayEvent::serial_status(link)).await;

    let (ws_tx, mut ws_rx) = socket.split();
    let forward = tokio::spawn(forward_events(events, ws_tx));

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<OperatorCommand>(&text) {
                Ok(cmd) => state.router.handle(cmd).await,
                Err(e) => {
                    state.errors.protocol();
                    debug!(%id, error = %e, "Ignoring unrecognized session message");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%id, error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    forward.abort();
    state.hub.unsubscribe(id).await;
    let active = state.lifecycle.disconnect().await;
    info!(%id, %peer, active, "Operator disconnected");
}

async fn forward_events<S>(mut events: mpsc::Receiver<Arc<GatewayEvent>>, mut ws_tx: S)
where
    S: futures::Sink<Message> + Unpin,
{
    while let Some(event) = events.recv().await {
        let text = match serde_json::to_string(event.as_ref()) {
            Ok(text) => text,
            Err(e) => {
                warn!(event_type = event.event_type_name(), error = %e, "Failed to serialize event");
                continue;
            }
        };
        if ws_tx.send(Message::Text(text)).await.is_err() {
            // Session gone; the read loop cleans up
            break;
        }
    }
}

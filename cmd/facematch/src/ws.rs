//! WebSocket adapter for the broadcast relay.
//!
//! Each socket gets a relay connection. Text and binary frames read from
//! the socket are broadcast as-is; frames queued for the connection are
//! written by a dedicated task so a slow socket only stalls itself.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use facematch_relay::Relay;
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::server::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state.relay))
}

async fn session(socket: WebSocket, relay: Arc<Relay<Message>>) {
    let mut conn = relay.connect();
    let id = conn.id();
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(msg) = conn.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                    let delivery = relay.broadcast(id, msg);
                    debug!(%id, delivered = delivery.delivered, skipped = delivery.skipped, "relayed frame");
                }
                // Ping/pong replies are handled by the transport.
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(%id, error = %e, "websocket read failed");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    relay.disconnect(id);
    writer.abort();
}

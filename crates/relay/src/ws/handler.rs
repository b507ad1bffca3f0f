use axum::extract::ws::{Message, WebSocket};
use beacon_common::protocol::push::{encode_push_frame, PushMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::current_request_id,
    hub::{BroadcastHub, ConnectionHandle},
};

/// Relay hub messages for one connection to its socket.
///
/// The first client frame is an informational handshake. After it, the loop
/// forwards outbox messages until the client closes, the socket fails, or
/// the hub cancels the connection. Cancellation wins over pending work, and
/// whatever the outbox already holds at that point is flushed before the
/// socket is closed. The connection's generation is always unregistered on
/// exit.
pub(crate) async fn forward_messages(
    hub: BroadcastHub,
    handle: ConnectionHandle,
    mut socket: WebSocket,
) {
    let ConnectionHandle { conn_id, generation, mut outbox, mut cancel } = handle;
    let request_id = current_request_id().unwrap_or_else(|| "unknown".to_string());

    let handshake = tokio::select! {
        biased;
        _ = cancel.changed() => {
            flush_outbox(&conn_id, &mut outbox, &mut socket).await;
            None
        }
        received = socket.recv() => received,
    };
    match handshake {
        Some(Ok(Message::Close(_))) | None => {
            finish(&hub, &conn_id, generation, socket).await;
            return;
        }
        Some(Ok(Message::Text(text))) => {
            info!(
                conn_id = %conn_id,
                request_id = %request_id,
                handshake = %text.as_str(),
                "websocket client connected"
            );
        }
        Some(Ok(_)) => {
            info!(conn_id = %conn_id, request_id = %request_id, "websocket client connected");
        }
        Some(Err(error)) => {
            warn!(conn_id = %conn_id, ?error, "websocket handshake failed");
            finish(&hub, &conn_id, generation, socket).await;
            return;
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => {
                debug!(conn_id = %conn_id, "connection cancelled");
                flush_outbox(&conn_id, &mut outbox, &mut socket).await;
                break;
            }
            maybe_message = outbox.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };
                if !write_push(&conn_id, &mut socket, &message).await {
                    break;
                }
            }
            maybe_inbound = socket.recv() => {
                match maybe_inbound {
                    None | Some(Ok(Message::Close(_))) => break,
                    Some(Err(error)) => {
                        debug!(conn_id = %conn_id, ?error, "websocket read failed");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    finish(&hub, &conn_id, generation, socket).await;
}

async fn write_push(conn_id: &str, socket: &mut WebSocket, message: &PushMessage) -> bool {
    let frame = encode_push_frame(message);
    match socket.send(Message::Text(frame.into())).await {
        Ok(()) => true,
        Err(error) => {
            warn!(conn_id = %conn_id, ?error, "failed to write push frame");
            false
        }
    }
}

/// Write out what was queued before the connection was cancelled.
async fn flush_outbox(
    conn_id: &str,
    outbox: &mut mpsc::Receiver<PushMessage>,
    socket: &mut WebSocket,
) {
    let mut flushed = 0usize;
    while let Ok(message) = outbox.try_recv() {
        if !write_push(conn_id, socket, &message).await {
            return;
        }
        flushed += 1;
    }
    if flushed > 0 {
        debug!(conn_id = %conn_id, flushed, "flushed queued messages before closing");
    }
}

async fn finish(hub: &BroadcastHub, conn_id: &str, generation: u64, mut socket: WebSocket) {
    if !hub.unregister(conn_id, generation).await {
        debug!(conn_id = %conn_id, generation, "connection already closed or superseded");
    }
    if let Err(error) = socket.send(Message::Close(None)).await {
        debug!(conn_id = %conn_id, ?error, "failed to send close frame");
    }
    info!(conn_id = %conn_id, "websocket connection closed");
}

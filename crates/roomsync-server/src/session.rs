//! One WebSocket connection: a writer task draining the outbound queue and
//! a reader loop dispatching requests.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, trace};

use roomsync_core::Identity;

use crate::connection::Connection;
use crate::gateway::Gateway;
use crate::handlers;
use crate::rpc::{RpcRequest, RpcResponse};

/// How long the writer gets to send its Close frame once the session ends.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Drive a socket until the peer leaves, the writer fails, or the
/// connection's token fires (gateway disconnect, stale sweep, shutdown).
/// Always ends with exactly one gateway disconnect.
pub async fn run_session(socket: WebSocket, gateway: Arc<Gateway>, identity: Identity, heartbeat: Duration) {
    let (conn, mut rx) = gateway.connect(identity);
    let closed = conn.closed_token().clone();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = conn.id.clone();
    let writer_closed = closed.clone();
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                () = writer_closed.cancelled() => break,
                frame = rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    trace!(conn_id = %writer_id, "sent ping");
                }
            }
        }
        // Wake the reader if the socket failed first.
        writer_closed.cancel();
        let _ = ws_tx.close().await;
    });

    loop {
        tokio::select! {
            () = closed.cancelled() => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    conn.record_pong();
                    if let Some(reply) = handle_text(&gateway, &conn, text.as_str()).await {
                        let _ = conn.send(reply.into());
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => conn.record_pong(),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(conn_id = %conn.id, error = %e, "socket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    let _ = gateway.disconnect(&conn.id);
    closed.cancel();
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    debug!(conn_id = %conn.id, "session ended");
}

/// Handle one text frame. Returns the serialized reply, if one is owed.
///
/// Requests without an `id` are fire-and-forget; unparseable frames always
/// get a `PARSE_ERROR`.
pub async fn handle_text(gateway: &Gateway, conn: &Arc<Connection>, text: &str) -> Option<String> {
    let response = match serde_json::from_str::<RpcRequest>(text) {
        Ok(request) => {
            let params = request.params.unwrap_or_else(|| serde_json::json!({}));
            let wants_reply = request.id.is_some();
            let response = handlers::dispatch(gateway, conn, &request.method, &params, request.id).await;
            if !wants_reply {
                return None;
            }
            response
        }
        Err(e) => {
            debug!(conn_id = %conn.id, error = %e, "unparseable frame");
            RpcResponse::parse_error()
        }
    };
    serde_json::to_string(&response).ok()
}

//! RPC method dispatch for one connection.

use std::sync::Arc;

use roomsync_core::SyncError;

use crate::connection::Connection;
use crate::gateway::Gateway;
use crate::rpc::{self, RpcResponse};

/// Dispatch an RPC method on behalf of `conn`.
pub async fn dispatch(
    gateway: &Gateway,
    conn: &Arc<Connection>,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let result = match method {
        "JoinRoom" => join_room(gateway, conn, params).await,
        "ChangeState" => change_state(gateway, conn, params).await,
        "NotifyInteraction" => notify_interaction(gateway, conn, params),
        "system.ping" => Ok(serde_json::json!({ "pong": true })),
        _ => return RpcResponse::method_not_found(id, method),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(e @ SyncError::Internal(_)) => {
            tracing::error!(conn_id = %conn.id, method, error = %e, "operation failed");
            RpcResponse::from_sync_error(id, &e)
        }
        Err(e) => {
            tracing::debug!(conn_id = %conn.id, method, retryable = e.is_retryable(), error = %e, "operation failed");
            RpcResponse::from_sync_error(id, &e)
        }
    }
}

async fn join_room(
    gateway: &Gateway,
    conn: &Arc<Connection>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, SyncError> {
    let room_id = rpc::require_str(params, "roomId")?;
    let current = gateway.join_room(conn, room_id).await?;
    Ok(serde_json::json!({ "joined": room_id, "hasState": current.is_some() }))
}

async fn change_state(
    gateway: &Gateway,
    conn: &Arc<Connection>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, SyncError> {
    let room_id = rpc::require_str(params, "roomId")?;
    let value = rpc::require_str(params, "value")?;
    let state = gateway.change_state(conn, room_id, value).await?;
    serde_json::to_value(&state).map_err(|e| SyncError::Internal(format!("serialize state: {e}")))
}

fn notify_interaction(
    gateway: &Gateway,
    conn: &Arc<Connection>,
    params: &serde_json::Value,
) -> Result<serde_json::Value, SyncError> {
    let room_id = rpc::require_str(params, "roomId")?;
    let subject_id = rpc::require_str(params, "subjectId")?;
    let delivered = gateway.notify_interaction(conn, room_id, subject_id)?;
    Ok(serde_json::json!({ "delivered": delivered }))
}

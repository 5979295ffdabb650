use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use roomsync_core::{Authenticator, SyncError};
use roomsync_store::StateStore;

use crate::auth::resolve_identity;
use crate::config::{AuthConfig, ServerConfig};
use crate::gateway::Gateway;
use crate::rpc::RpcResponse;
use crate::session;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub authenticator: Arc<dyn Authenticator>,
    pub auth_required: bool,
    pub heartbeat: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/roomhub", get(hub_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, spawn the server and the stale-connection sweeper, and return a
/// handle that owns both.
pub async fn start(
    server: &ServerConfig,
    auth: &AuthConfig,
    store: Arc<dyn StateStore>,
    authenticator: Arc<dyn Authenticator>,
) -> Result<ServerHandle, std::io::Error> {
    let shutdown = CancellationToken::new();
    let gateway = Arc::new(Gateway::with_shutdown(store, server.max_send_queue, shutdown.clone()));

    let state = AppState {
        gateway: Arc::clone(&gateway),
        authenticator,
        auth_required: auth.required,
        heartbeat: Duration::from_secs(server.heartbeat_interval_secs),
    };

    let cleanup = start_cleanup_task(
        Arc::clone(&gateway),
        Duration::from_secs(server.cleanup_interval_secs),
        server.client_timeout_secs,
        shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind((server.host.as_str(), server.port)).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "roomsync server started");

    let router = build_router(state);
    let token = shutdown.clone();
    let serve = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        local_addr,
        gateway,
        shutdown,
        serve,
        cleanup,
    })
}

/// Handle returned by `start()`; keeps background tasks alive.
pub struct ServerHandle {
    local_addr: SocketAddr,
    gateway: Arc<Gateway>,
    shutdown: CancellationToken,
    serve: JoinHandle<()>,
    cleanup: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Stop accepting, end every session and drop all membership.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.serve.await {
            warn!(error = %e, "server task panicked");
        }
        let _ = self.cleanup.await;
        self.gateway.shutdown();
        info!("roomsync server stopped");
    }
}

fn start_cleanup_task(
    gateway: Arc<Gateway>,
    every: Duration,
    timeout_secs: u64,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let _ = gateway.disconnect_stale(timeout_secs);
                }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct HubQuery {
    access_token: Option<String>,
}

async fn hub_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<HubQuery>,
    State(state): State<AppState>,
) -> Response {
    let identity = match resolve_identity(
        state.authenticator.as_ref(),
        query.access_token.as_deref(),
        state.auth_required,
    ) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "upgrade refused");
            let body = RpcResponse::from_sync_error(None, &SyncError::from(e));
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }
    };

    ws.on_upgrade(move |socket| {
        session::run_session(socket, state.gateway, identity, state.heartbeat)
    })
    .into_response()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.gateway.connection_count(),
        "rooms": state.gateway.room_count(),
    }))
}

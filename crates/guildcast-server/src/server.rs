use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use guildcast_core::{ConnectionId, GatewayEvent, GuildId};
use guildcast_store::TokenStore;

use crate::auth::{self, AuthState, AuthedGuild, TokenResolver};
use crate::client::{self, ConnectionRegistry};
use crate::message;
use crate::router::EventRouter;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            max_send_queue: 256,
        }
    }
}

/// Shared state for the axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
}

/// Build the router. The authentication gate wraps every route, the `/ws`
/// upgrade included.
pub fn build_router(state: AppState, resolver: AuthState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(
            resolver,
            auth::auth_middleware,
        ))
        .with_state(state)
}

/// Create and start the server. Returns a handle owning the background
/// tasks; dropping it does not close already-open connections, call
/// [`ServerHandle::shutdown`] for that.
pub async fn start(
    config: ServerConfig,
    store: Arc<dyn TokenStore>,
    event_tx: broadcast::Sender<GatewayEvent>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));

    let router_handle = EventRouter::new(Arc::clone(&registry)).start(event_tx.subscribe());

    let (message_tx, message_rx) = mpsc::channel::<(ConnectionId, String)>(1024);
    let messages_handle = tokio::spawn(message::log_client_messages(message_rx));

    let resolver: AuthState = Arc::new(TokenResolver::new(store));

    let app_state = AppState {
        registry: Arc::clone(&registry),
        message_tx,
    };
    let app = build_router(app_state, resolver);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let local_addr = listener.local_addr()?;

    info!(port = local_addr.port(), "guildcast server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        _server: server_handle,
        _router: router_handle,
        _messages: messages_handle,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    registry: Arc<ConnectionRegistry>,
    _server: tokio::task::JoinHandle<()>,
    _router: tokio::task::JoinHandle<()>,
    _messages: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Drain the registry and close every live connection: each writer task
    /// sends a Close frame and ends once its queue is dropped.
    pub fn shutdown(&self) {
        let closed = self.registry.close_all();
        info!(closed, "registry drained");
    }
}

/// WebSocket upgrade handler. Only reachable through the gate, so the
/// authenticated guild is always present in extensions.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(AuthedGuild(guild)): Extension<AuthedGuild>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, guild, remote, state))
}

async fn handle_socket(socket: WebSocket, guild: GuildId, remote: SocketAddr, state: AppState) {
    let (conn_id, rx) = state.registry.register(guild.clone(), Some(remote));
    info!(conn = %conn_id, guild = %guild, remote = %remote, "client connected");

    client::handle_connection(socket, conn_id, rx, state.registry, state.message_tx).await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.len(),
    }))
}

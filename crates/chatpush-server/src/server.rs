//! `ChatServer`: axum router, listener and shared handler state.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chatpush_core::{AccountId, RegistryError};
use chatpush_settings::ServerSettings;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::health::{self, HealthResponse};
use crate::registry::{ConnectionRegistry, DeliveryReport, RegistryStats};
use crate::session;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Listener and session settings.
    pub settings: Arc<ServerSettings>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server was created.
    pub start_time: Instant,
}

/// The notification server. Owns the one registry every handler shares.
pub struct ChatServer {
    settings: Arc<ServerSettings>,
    registry: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

/// A running listener.
pub struct ServerHandle {
    /// Address actually bound (port 0 resolves here).
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The serve task; completes after graceful shutdown.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

impl ChatServer {
    /// Create a server with an empty registry.
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            settings: self.settings.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/ws/chat", get(ws_global))
            .route("/ws/chat/{account_id}", get(ws_account))
            .route("/health", get(health_handler))
            .route("/api/ws/connections", get(connections_handler))
            .route("/api/ws/broadcast", post(broadcast_all_handler))
            .route("/api/ws/broadcast/{account_id}", post(broadcast_group_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown is signalled.
    pub async fn listen(&self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.settings.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "http server stopped with error");
            }
        });

        info!(%addr, "chatpush server listening");
        Ok(ServerHandle { addr, task })
    }

    /// The shared registry, for pushing events from elsewhere in the process.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server settings.
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }
}

/// JSON error body for HTTP callers.
#[derive(Debug)]
pub struct ApiError(RegistryError);

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "broadcast request failed");
        let body = json!({ "error": self.0.to_string() });
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

/// GET /ws/chat
async fn ws_global(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    upgrade(ws, None, state)
}

/// GET /ws/chat/{account_id}
async fn ws_account(
    ws: WebSocketUpgrade,
    Path(account_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, Some(AccountId::new(account_id)), state)
}

fn upgrade(ws: WebSocketUpgrade, account: Option<AccountId>, state: AppState) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }
    ws.max_message_size(state.settings.max_message_size)
        .on_upgrade(move |socket| session::run_connection(socket, account, state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        &state.registry,
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /api/ws/connections
async fn connections_handler(State(state): State<AppState>) -> Json<RegistryStats> {
    Json(state.registry.stats())
}

/// POST /api/ws/broadcast
async fn broadcast_all_handler(
    State(state): State<AppState>,
    Json(message): Json<Value>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let report = state.registry.broadcast_to_all(&message).await?;
    Ok(Json(report))
}

/// POST /api/ws/broadcast/{account_id}
async fn broadcast_group_handler(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(message): Json<Value>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let account = AccountId::new(account_id);
    let report = state.registry.broadcast_to_group(&account, &message).await?;
    Ok(Json(report))
}

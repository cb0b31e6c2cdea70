//! `HearthServer`: Axum HTTP + WebSocket gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use hearth_core::{EntityType, HouseholdId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::notifier::ChangeNotifier;
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handshake::HandshakeParams;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<ServerConfig>,
    /// Live household channels.
    pub registry: Arc<ConnectionRegistry>,
    /// Publisher over `registry`.
    pub notifier: ChangeNotifier,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Monotonic start time.
    pub start_time: Instant,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
}

/// Body of `POST /households/{householdId}/changes`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Entity type that changed.
    pub entity_type: EntityType,
    /// Optional hint forwarded to clients.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Response of the publish endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Sessions the event was enqueued for.
    pub recipients: usize,
}

/// The realtime gateway.
pub struct HearthServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    notifier: ChangeNotifier,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl HearthServer {
    /// Create a server with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.max_dropped_messages));
        Self {
            config: Arc::new(config),
            notifier: ChangeNotifier::new(Arc::clone(&registry)),
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&registry))),
            registry,
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
            registry: Arc::clone(&self.registry),
            notifier: self.notifier.clone(),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            started_at: self.started_at,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws_handler))
            .route("/households/{household_id}/changes", post(publish_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let target = format!("{}:{}", self.config.host, self.config.port);
        let addr = tokio::net::lookup_host(&target)
            .await?
            .next()
            .ok_or_else(|| ServerError::InvalidAddress(target.clone()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = result {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(%local_addr, "hearth gateway listening");
        Ok((local_addr, handle))
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Publisher for persistence code running in-process.
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.started_at,
        state.registry.session_count(),
        state.registry.channel_count(),
    ))
}

/// GET /ws: validate the handshake, then upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HandshakeParams>,
    State(state): State<AppState>,
) -> Response {
    let (household_id, identity) = match params.validate() {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, "rejected websocket handshake");
            return e.into_response();
        }
    };

    if state.registry.session_count() >= state.config.max_connections {
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    }

    let options = state.config.session_options();
    let shutdown = state.shutdown.token();
    let registry = Arc::clone(&state.registry);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            run_ws_session(socket, household_id, identity, registry, options, shutdown)
        })
}

/// POST /households/{household_id}/changes
async fn publish_handler(
    Path(household_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<PublishRequest>,
) -> (StatusCode, Json<PublishResponse>) {
    let household_id = HouseholdId::from(household_id);
    let recipients = state
        .notifier
        .notify(body.entity_type, &household_id, body.payload);
    (StatusCode::ACCEPTED, Json(PublishResponse { recipients }))
}

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::engine::{sensor_icon, Engine, Instance};

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Entry of the /v1/instances listing
#[derive(Serialize)]
struct InstanceSummary {
    name: String,
    actions_enabled: bool,
    stale: bool,
}

/// Status sensor for one group
#[derive(Serialize)]
struct GroupSensor {
    name: String,
    value: Option<String>,
    icon: &'static str,
}

/// Response for GET /v1/instances/:name
#[derive(Serialize)]
struct InstanceDetail {
    name: String,
    actions_enabled: bool,
    stale: bool,
    auth_failed: bool,
    last_error: Option<String>,
    groups: Vec<GroupSensor>,
    ticks: u64,
    failed_polls: u64,
    commands_issued: u64,
    failed_commands: u64,
}

#[derive(Deserialize)]
struct ActionsRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct ActionsResponse {
    name: String,
    actions_enabled: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
struct AppState {
    version: &'static str,
    engine: Arc<RwLock<Engine>>,
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("unknown instance '{}'", name),
        }),
    )
        .into_response()
}

impl InstanceDetail {
    fn from_instance(instance: &Instance) -> Self {
        let snapshot = instance.snapshot();
        let groups = instance
            .config()
            .groups
            .keys()
            .map(|group| {
                let value = snapshot
                    .last_status
                    .as_ref()
                    .and_then(|status| status.token(group))
                    .map(str::to_string);
                GroupSensor {
                    icon: sensor_icon(value.as_deref()),
                    name: group.clone(),
                    value,
                }
            })
            .collect();

        Self {
            name: instance.name().to_string(),
            actions_enabled: instance.actions_enabled(),
            stale: snapshot.stale,
            auth_failed: snapshot.auth_failed,
            last_error: snapshot.last_error.clone(),
            groups,
            ticks: snapshot.ticks,
            failed_polls: snapshot.failed_polls,
            commands_issued: snapshot.commands_issued,
            failed_commands: snapshot.failed_commands,
        }
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/instances
#[tracing::instrument(skip(state))]
async fn list_instances(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = state.engine.read().await;
    let instances: Vec<InstanceSummary> = engine
        .instances()
        .map(|instance| InstanceSummary {
            name: instance.name().to_string(),
            actions_enabled: instance.actions_enabled(),
            stale: instance.snapshot().stale,
        })
        .collect();

    Json(instances)
}

/// Handler for GET /v1/instances/:name
#[tracing::instrument(skip(state))]
async fn get_instance(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.engine.read().await.instance(&name) {
        Some(instance) => Json(InstanceDetail::from_instance(&instance)).into_response(),
        None => not_found(&name),
    }
}

/// Handler for PUT /v1/instances/:name/actions
#[tracing::instrument(skip(state, request))]
async fn set_actions(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(request): Json<ActionsRequest>,
) -> Response {
    let Some(instance) = state.engine.read().await.instance(&name) else {
        return not_found(&name);
    };

    instance.set_actions_enabled(request.enabled);
    Json(ActionsResponse {
        name,
        actions_enabled: instance.actions_enabled(),
    })
    .into_response()
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/instances", get(list_instances))
        .route("/v1/instances/:name", get(get_instance))
        .route("/v1/instances/:name/actions", put(set_actions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the HTTP API listener
///
/// Address and bind errors surface here, before [`serve`] is spawned.
pub async fn bind(
    listen: &str,
    port: u16,
) -> Result<TcpListener, Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Serve the HTTP API on a bound listener
///
/// Runs until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listener` - Listener returned by [`bind`]
/// * `engine` - The engine whose instances are exposed
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listener: TcpListener,
    engine: Arc<RwLock<Engine>>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> std::io::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, engine });
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await
}

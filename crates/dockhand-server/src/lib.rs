//! HTTP/WebSocket surface over the fleet backend.
//!
//! REST routes cover the one-shot operations; two WebSocket routes carry
//! the live feeds (status polling and per-container log following). All
//! handlers resolve the target host through the shared [`HostRegistry`]
//! and open a fresh backend per request.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use dockhand_backend::{backend_for, collect_fleet, Backend, BackendError};
use dockhand_common::{
    ComposeAction, ContainerRecord, DockhandError, FleetSnapshot, HostDescriptor, ImageRecord,
    LogQuery, Tail,
};

pub mod registry;
pub mod ws;

pub use registry::HostRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<HostRegistry>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Host registry
        .route("/api/hosts", get(list_hosts_handler).post(add_host_handler))
        .route("/api/hosts/:host", delete(remove_host_handler))
        // Fleet-wide aggregate
        .route("/api/containers", get(fleet_containers_handler))
        // Per-host queries
        .route("/api/hosts/:host/containers", get(list_containers_handler))
        .route("/api/hosts/:host/images", get(list_images_handler))
        // Container lifecycle
        .route(
            "/api/hosts/:host/containers/:id/start",
            post(start_container_handler),
        )
        .route(
            "/api/hosts/:host/containers/:id/stop",
            post(stop_container_handler),
        )
        .route(
            "/api/hosts/:host/containers/:id/restart",
            post(restart_container_handler),
        )
        .route("/api/hosts/:host/images/:id", delete(delete_image_handler))
        // One-shot logs
        .route("/api/hosts/:host/containers/:id/logs", get(get_logs_handler))
        // Compose stacks
        .route("/api/compose", post(compose_handler))
        // Live feeds
        .route("/ws/status", get(ws::status_feed_handler))
        .route(
            "/ws/hosts/:host/containers/:id/logs",
            get(ws::log_stream_handler),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error envelope returned by every failing route.
pub struct ApiError(DockhandError);

impl From<DockhandError> for ApiError {
    fn from(err: DockhandError) -> Self {
        Self(err)
    }
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DockhandError::NotFound(_) => StatusCode::NOT_FOUND,
            DockhandError::Connection(_) | DockhandError::HostUnreachable(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Resolve a host name and open its backend.
fn backend(state: &AppState, host: &str) -> Result<Box<dyn Backend>, ApiError> {
    let descriptor = state
        .registry
        .get(host)
        .ok_or_else(|| ApiError(DockhandError::NotFound(format!("host {host}"))))?;
    Ok(backend_for(&descriptor)?)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn list_hosts_handler(State(state): State<AppState>) -> Json<Vec<HostDescriptor>> {
    Json(state.registry.list())
}

async fn add_host_handler(
    State(state): State<AppState>,
    Json(host): Json<HostDescriptor>,
) -> impl IntoResponse {
    let name = host.name.clone();
    state.registry.register(host);
    (StatusCode::CREATED, Json(serde_json::json!({ "name": name })))
}

async fn remove_host_handler(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .remove(&host)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or_else(|| ApiError(DockhandError::NotFound(format!("host {host}"))))
}

async fn fleet_containers_handler(State(state): State<AppState>) -> Json<FleetSnapshot> {
    let hosts = state.registry.list();
    Json(collect_fleet(&hosts, &backend_for).await)
}

async fn list_containers_handler(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Result<Json<Vec<ContainerRecord>>, ApiError> {
    Ok(Json(backend(&state, &host)?.list_containers().await?))
}

async fn list_images_handler(
    State(state): State<AppState>,
    Path(host): Path<String>,
) -> Result<Json<Vec<ImageRecord>>, ApiError> {
    Ok(Json(backend(&state, &host)?.list_images().await?))
}

async fn start_container_handler(
    State(state): State<AppState>,
    Path((host, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    backend(&state, &host)?.start_container(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stop_container_handler(
    State(state): State<AppState>,
    Path((host, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    backend(&state, &host)?.stop_container(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restart_container_handler(
    State(state): State<AppState>,
    Path((host, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    backend(&state, &host)?.restart_container(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_image_handler(
    State(state): State<AppState>,
    Path((host, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    backend(&state, &host)?.delete_image(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub tail: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub search: Option<String>,
}

impl LogsParams {
    fn into_query(self) -> LogQuery {
        LogQuery {
            tail: self
                .tail
                .as_deref()
                .map(|t| t.parse().unwrap_or_default())
                .unwrap_or_default(),
            since: self.since,
            until: self.until,
            search: self.search,
        }
    }
}

async fn get_logs_handler(
    State(state): State<AppState>,
    Path((host, id)): Path<(String, String)>,
    Query(params): Query<LogsParams>,
) -> Result<String, ApiError> {
    let query = params.into_query();
    Ok(backend(&state, &host)?.get_logs(&id, &query).await?)
}

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    pub host: String,
    pub path: String,
    pub action: ComposeAction,
}

async fn compose_handler(
    State(state): State<AppState>,
    Json(req): Json<ComposeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let output = backend(&state, &req.host)?
        .run_compose(&req.path, req.action)
        .await?;
    Ok(Json(serde_json::json!({ "output": output })))
}

/// Tail requested for a live log follow; defaults to the last 100 lines so
/// a fresh subscriber gets context without replaying the full history.
pub(crate) fn follow_tail(params: &LogsParams) -> Tail {
    params
        .tail
        .as_deref()
        .map(|t| t.parse().unwrap_or_default())
        .unwrap_or(Tail::Lines(100))
}

#[cfg(test)]
mod tests;

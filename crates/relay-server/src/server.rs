//! HTTP server for Alertmanager webhooks.

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use relay::{AlertmanagerPayload, Notifier, NotifyError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Room router
    pub notifier: Arc<Notifier>,
    /// Prometheus exposition handle
    pub prometheus: PrometheusHandle,
}

/// Build the relay router.
pub fn build_router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Query parameters for `/dispatch`.
#[derive(Debug, Deserialize)]
struct DispatchQuery {
    room_name: Option<String>,
}

/// Response for the dispatch handler.
#[derive(Debug, Serialize)]
struct DispatchResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    room: Option<String>,
    alerts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DispatchResponse {
    fn failed(room: Option<String>, alerts: usize, error: String) -> Json<Self> {
        Json(Self {
            status: "error",
            room,
            alerts,
            error: Some(error),
        })
    }
}

/// Alertmanager webhook handler.
async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DispatchQuery>,
    Json(payload): Json<AlertmanagerPayload>,
) -> impl IntoResponse {
    let alert_count = payload.alerts.len();

    let Some(room) = query.room_name.filter(|r| !r.trim().is_empty()) else {
        warn!(alerts = alert_count, "Dispatch request without room_name");
        return (
            StatusCode::BAD_REQUEST,
            DispatchResponse::failed(None, alert_count, "missing room_name query parameter".to_string()),
        );
    };

    info!(
        room = %room,
        alerts = alert_count,
        status = %payload.status,
        "Received alert webhook"
    );

    match state.notifier.dispatch(&payload.alerts, &room).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DispatchResponse {
                status: "ok",
                room: Some(room),
                alerts: alert_count,
                error: None,
            }),
        ),
        Err(e @ NotifyError::NoProvider(_)) => (
            StatusCode::NOT_FOUND,
            DispatchResponse::failed(Some(room), alert_count, e.to_string()),
        ),
        Err(e) => {
            error!(room = %room, error = %e, "Failed to dispatch alerts");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                DispatchResponse::failed(Some(room), alert_count, e.to_string()),
            )
        }
    }
}

/// Prometheus exposition.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus.render(),
    )
}

async fn health_handler() -> &'static str {
    "OK"
}

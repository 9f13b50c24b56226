//! `vizor serve`: HTTP surface plus the periodic reaper.

use crate::context::AppContext;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use vizor_application::{ReaperScheduler, SessionCreated, ViewerSessionUseCase};
use vizor_core::VizorError;
use vizor_core::config::VizorConfig;
use vizor_core::session::VisualizationRequest;

#[derive(Clone)]
struct ServiceState {
    usecase: Arc<ViewerSessionUseCase>,
    scheduler: Arc<ReaperScheduler>,
}

pub async fn run(config: VizorConfig, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let ctx = AppContext::connect(config).await?;

    let scheduler = ctx.scheduler();
    let reaper_loop = scheduler.start();
    let state = ServiceState {
        usecase: Arc::new(ctx.usecase()),
        scheduler,
    };

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;
    tracing::info!(target: "vizor::serve", "[Serve] Listening on {}", bind);

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    reaper_loop.abort();
    served.context("Server error")?;

    tracing::info!(target: "vizor::serve", "[Serve] Stopped");
    Ok(())
}

fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/viewer_health_check", get(viewer_health_check))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(target: "vizor::serve", "[Serve] Failed to listen for shutdown: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn create_session(
    State(state): State<ServiceState>,
    Json(request): Json<VisualizationRequest>,
) -> std::result::Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let created = state.usecase.create_session(&request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Kicks off a sweep and answers right away, whatever the sweep does.
async fn viewer_health_check(State(state): State<ServiceState>) -> &'static str {
    state.scheduler.trigger();
    "checked ng viewer health"
}

async fn healthz() -> &'static str {
    "ok"
}

struct ApiError(VizorError);

impl From<VizorError> for ApiError {
    fn from(err: VizorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VizorError::InvalidRequest(_) | VizorError::InvalidSessionName(_) => StatusCode::BAD_REQUEST,
            VizorError::NoLayersProvisioned { .. }
            | VizorError::Provisioner { .. }
            | VizorError::RouteTable { .. } => StatusCode::BAD_GATEWAY,
            VizorError::ViewerFailedToStart { .. } => StatusCode::GATEWAY_TIMEOUT,
            VizorError::Registry(_) | VizorError::Decode { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "vizor::serve", "[Serve] Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

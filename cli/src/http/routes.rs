//! HTTP route handlers

use std::convert::Infallible;
use std::path::PathBuf;

use async_stream::stream;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use futures::Stream;
use rmdrender_core::api::detect_source_type;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::http::{error::HttpServerError, output::output_handler, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    /// Absolute or `~`-aliased path of the document.
    pub file: String,
    /// Negative (the default) when the request carries no source position.
    #[serde(default = "no_line")]
    pub line: i32,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn no_line() -> i32 {
    -1
}

fn default_encoding() -> String {
    "UTF-8".to_string()
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub started: bool,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub rmarkdown_installed: bool,
    pub render_running: bool,
}

#[derive(Debug, Deserialize)]
pub struct SourceTypeRequest {
    pub path: String,
    #[serde(default)]
    pub contents: String,
}

#[derive(Debug, Serialize)]
pub struct SourceTypeResponse {
    pub source_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_id: String,
    pub uptime_seconds: f64,
    pub render_running: bool,
    pub timestamp: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/render", post(render_handler))
        .route("/api/v1/render/terminate", post(terminate_handler))
        .route("/api/v1/context", get(context_handler))
        .route("/api/v1/events", get(events_handler))
        .route("/api/v1/source-type", post(source_type_handler))
        .route("/rmd_output/*path", get(output_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/shutdown", post(shutdown_handler))
        .with_state(state)
}

/// POST /api/v1/render
async fn render_handler(
    State(state): State<AppState>,
    Json(req): Json<RenderRequest>,
) -> Result<Json<RenderResponse>, HttpServerError> {
    if req.file.trim().is_empty() {
        return Err(HttpServerError::InvalidRequest("file is required".into()));
    }
    let target: PathBuf = state.aliaser().resolve(&req.file);
    if !target.is_absolute() {
        return Err(HttpServerError::InvalidRequest(format!(
            "file must be an absolute path: {}",
            req.file
        )));
    }

    let started = state
        .supervisor
        .start_render(target, u32::try_from(req.line).ok(), &req.encoding);
    Ok(Json(RenderResponse { started }))
}

/// POST /api/v1/render/terminate
async fn terminate_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.supervisor.terminate_render();
    Json(serde_json::json!({ "success": true }))
}

/// GET /api/v1/context
async fn context_handler(State(state): State<AppState>) -> Json<ContextResponse> {
    let rmarkdown_installed = state.environment().have_required_version().await;
    Json(ContextResponse {
        rmarkdown_installed,
        render_running: state.supervisor.is_render_running(),
    })
}

/// GET /api/v1/events - render events as server-sent events
async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let events = stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match Event::default().event(event.name()).json_data(&event) {
                    Ok(sse) => yield Ok::<Event, Infallible>(sse),
                    Err(e) => {
                        tracing::warn!(target: "rmdrender.http", error = %e, "event not serializable");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "rmdrender.http", skipped, "event subscriber lagging");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// POST /api/v1/source-type - documents are only claimed as R Markdown while
/// the rmarkdown package is installed.
async fn source_type_handler(
    State(state): State<AppState>,
    Json(req): Json<SourceTypeRequest>,
) -> Json<SourceTypeResponse> {
    if !state.environment().have_required_version().await {
        return Json(SourceTypeResponse { source_type: None });
    }
    let path = state.aliaser().resolve(&req.path);
    Json(SourceTypeResponse {
        source_type: detect_source_type(&path, &req.contents, state.markdown_to_html_override),
    })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        session_id: state.session_id.clone(),
        uptime_seconds: state.uptime_seconds(),
        render_running: state.supervisor.is_render_running(),
        timestamp: Local::now().to_rfc3339(),
    })
}

/// POST /api/v1/shutdown - trigger graceful shutdown
async fn shutdown_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let _ = state.shutdown_tx.send(());

    Json(serde_json::json!({
        "success": true,
        "message": "Shutdown signal sent"
    }))
}

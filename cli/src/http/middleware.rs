//! HTTP middleware

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use rmdrender_core::api::OUTPUT_MOUNT;
use std::time::{Duration, Instant};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Applies to producing the response head only; streamed bodies (SSE, the
/// rewritten artifact) are not cut off.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost",
    "https://localhost",
    "http://127.0.0.1",
    "https://127.0.0.1",
];

pub fn create_middleware_stack() -> tower::layer::util::Stack<CorsLayer, TimeoutLayer> {
    tower::layer::util::Stack::new(preview_cors(), TimeoutLayer::new(REQUEST_TIMEOUT))
}

/// The preview is served to a local browser or desktop shell only.
fn preview_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(is_local_origin)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::CACHE_CONTROL])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

fn is_local_origin(origin: &str) -> bool {
    LOCAL_ORIGINS.iter().any(|prefix| {
        origin
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(':'))
    })
}

pub fn create_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Debug,
    Info,
    Warn,
}

/// A single preview pulls in dozens of figures and scripts; those stay at
/// debug unless they fail.
fn log_level(path: &str, status: StatusCode) -> LogLevel {
    if status.is_client_error() || status.is_server_error() {
        LogLevel::Warn
    } else if path
        .strip_prefix('/')
        .is_some_and(|p| p.starts_with(OUTPUT_MOUNT))
    {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

pub async fn request_logger(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match log_level(uri.path(), response.status()) {
        LogLevel::Warn => tracing::warn!(target: "rmdrender.http", %method, %uri, status, elapsed_ms, "request failed"),
        LogLevel::Info => tracing::info!(target: "rmdrender.http", %method, %uri, status, elapsed_ms, "request served"),
        LogLevel::Debug => tracing::debug!(target: "rmdrender.http", %method, %uri, status, elapsed_ms, "resource served"),
    }
    response
}

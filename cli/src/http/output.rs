//! `GET /rmd_output/*path`: the rendered artifact and everything it links to.

use std::path::Path as FsPath;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::Response,
};
use rmdrender_core::api::{requests_mathjax, resolve_output_request, MathjaxFilter, OutputResource};
use tokio::io::BufReader;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::http::{error::HttpServerError, state::AppState};

const CACHEABLE: &str = "private, max-age=86400";
const NO_CACHE: &str = "no-cache, no-store, max-age=0, must-revalidate";
const EXPIRED: &str = "Fri, 01 Jan 1990 00:00:00 GMT";

/// `path` has been percent-decoded once by the router; the output file
/// segment is decoded again during resolution.
pub async fn output_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, HttpServerError> {
    let mathjax_dir = if requests_mathjax(&path) {
        state.environment().mathjax_directory().await
    } else {
        None
    };
    let resource = resolve_output_request(&path, state.aliaser().as_ref(), mathjax_dir.as_deref())?;
    tracing::debug!(target: "rmdrender.http", path = %path, resource = ?resource, "output resolved");

    match resource {
        OutputResource::Artifact(file) => serve_artifact(&file, state.desktop_mode).await,
        OutputResource::MathJax(file) | OutputResource::Nested(file) => {
            Ok(serve_cacheable(&file, request).await)
        }
    }
}

/// The artifact itself is rewritten on the fly and must never be cached: it
/// changes on every render.
async fn serve_artifact(file: &FsPath, desktop_mode: bool) -> Result<Response, HttpServerError> {
    let handle = tokio::fs::File::open(file)
        .await
        .map_err(|source| HttpServerError::Read {
            path: file.display().to_string(),
            source,
        })?;
    let body = MathjaxFilter::for_host(desktop_mode).filter_stream(BufReader::new(handle));

    let mut response = Response::new(Body::from_stream(body));
    let headers = response.headers_mut();
    let mime = mime_guess::from_path(file).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    set_no_cache(headers);
    Ok(response)
}

async fn serve_cacheable(file: &FsPath, request: Request) -> Response {
    let mut response = match ServeFile::new(file).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    if matches!(
        response.status(),
        StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED
    ) {
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static(CACHEABLE));
    }
    response
}

fn set_no_cache(headers: &mut HeaderMap) {
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static(EXPIRED));
}

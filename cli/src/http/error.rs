use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rmdrender_core::api::ResolveError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpServerError {
    /// Body is sent verbatim so the preview shows which file is missing.
    #[error("{0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ResolveError> for HttpServerError {
    fn from(e: ResolveError) -> Self {
        HttpServerError::NotFound(e.to_string())
    }
}

impl HttpServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpServerError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            HttpServerError::Read { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                StatusCode::NOT_FOUND
            }
            HttpServerError::Read { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(target: "rmdrender.http", error = ?self, "request failed");
        }
        match self {
            HttpServerError::InvalidRequest(msg) => (
                status,
                Json(serde_json::json!({ "success": false, "error": msg })),
            )
                .into_response(),
            other => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                other.to_string(),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_are_not_found() {
        let err = HttpServerError::from(ResolveError::NotFound("~/a.html".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "~/a.html not found");
    }

    #[test]
    fn read_errors_map_by_kind() {
        let missing = HttpServerError::Read {
            path: "x".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let denied = HttpServerError::Read {
            path: "x".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert_eq!(denied.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

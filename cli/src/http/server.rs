//! HTTP server lifecycle

use crate::http::{
    middleware::{create_middleware_stack, create_trace_layer, request_logger},
    routes::create_router,
    AppState,
};
use axum::middleware;
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

pub async fn start_server(
    config: ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let session_id = state.session_id.clone();
    info!(
        target: "rmdrender.http",
        host = %config.host,
        port = config.port,
        session_id = %session_id,
        "starting HTTP server"
    );

    let router = create_router(state.clone());
    let app = router
        .layer(middleware::from_fn(request_logger))
        .layer(create_trace_layer())
        .layer(create_middleware_stack());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let bound = listener.local_addr()?;
    info!(target: "rmdrender.http", "HTTP server listening on http://{}", bound);

    let state_file = match servers_dir() {
        Some(dir) => match create_state_file(&dir, &session_id, bound.port()) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(target: "rmdrender.http", error = %e, "failed to write state file");
                None
            }
        },
        None => None,
    };

    let shutdown_rx = state.shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_rx))
        .await?;

    // A render still running would otherwise outlive the server.
    state.supervisor.terminate_render();
    info!(target: "rmdrender.http", "server stopped");

    if let Some(path) = state_file {
        if let Err(e) = fs::remove_file(&path) {
            warn!(target: "rmdrender.http", error = %e, path = %path.display(), "state file not removed");
        }
    }

    Ok(())
}

/// Resolves on Ctrl+C, SIGTERM or `POST /api/v1/shutdown`.
async fn shutdown_signal(mut api: broadcast::Receiver<()>) {
    let source = tokio::select! {
        _ = signal::ctrl_c() => "ctrl-c",
        _ = api.recv() => "api",
        _ = wait_for_sigterm() => "sigterm",
    };
    info!(target: "rmdrender.http", source, "shutting down");
}

/// Records where a running server can be reached, for tools that attach to it.
fn create_state_file(dir: &Path, session_id: &str, port: u16) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(dir)?;
    let state_file = dir.join(format!("http-{}.pid", port));

    let mut file = fs::File::create(&state_file)?;
    writeln!(file, "session_id={}", session_id)?;
    writeln!(file, "port={}", port)?;
    writeln!(file, "pid={}", std::process::id())?;
    writeln!(file, "start_time={}", chrono::Local::now().to_rfc3339())?;

    Ok(state_file)
}

/// `~/.rmdrender/servers`
fn servers_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".rmdrender").join("servers"))
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(target: "rmdrender.http", error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::test_state;
    use rmdrender_core::api::RenderConfig;
    use std::time::Duration;

    #[test]
    fn test_create_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = create_state_file(&dir.path().join("servers"), "test-session", 9999).unwrap();
        assert!(state_file.ends_with("http-9999.pid"));

        let content = fs::read_to_string(&state_file).unwrap();
        assert!(content.contains("session_id=test-session"));
        assert!(content.contains("port=9999"));
        assert!(content.contains("pid="));
    }

    #[tokio::test]
    async fn test_server_lifecycle() {
        let home = tempfile::tempdir().unwrap();
        let state = test_state(home.path(), RenderConfig::default(), None);
        let shutdown_tx = state.shutdown_tx.clone();

        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
        };
        let server = tokio::spawn(async move { start_server(config, state).await.is_ok() });

        tokio::time::sleep(Duration::from_millis(300)).await;
        let _ = shutdown_tx.send(());

        let result = tokio::time::timeout(Duration::from_secs(5), server).await;
        assert!(matches!(result, Ok(Ok(true))), "server should shut down gracefully");
    }
}

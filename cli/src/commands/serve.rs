use std::sync::Arc;

use anyhow::{anyhow, Result};
use rmdrender_core::api::{AppConfig, RenderSupervisor};
use rmdrender_plugins::factory::build_services;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::commands::cli::ServeArgs;
use crate::http::{
    server::{start_server, ServerConfig},
    state::EVENT_CHANNEL_CAPACITY,
    AppState,
};

pub async fn handle_serve(args: ServeArgs, cfg: AppConfig) -> Result<i32> {
    let session_id = args
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let services = build_services(&cfg, Arc::new(events.clone()));
    let supervisor = Arc::new(RenderSupervisor::new(Arc::new(services)));
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = AppState::new(session_id, supervisor, events, shutdown_tx);

    // Discovery runs an interpreter; warm the cache before the first preview.
    let environment = Arc::clone(state.environment());
    tokio::spawn(async move {
        match environment.mathjax_directory().await {
            Some(dir) => tracing::info!(target: "rmdrender.serve", dir = %dir.display(), "MathJax bundle found"),
            None => tracing::warn!(target: "rmdrender.serve", "no MathJax bundle; math will not render in previews"),
        }
    });

    let config = ServerConfig {
        host: cfg.http_server.host.clone(),
        port: cfg.http_server.port,
    };
    start_server(config, state).await.map_err(|e| anyhow!(e))?;
    Ok(0)
}

use std::sync::Arc;
use std::time::Instant;

use rmdrender_core::api::{PathAliaser, RenderEnvironment, RenderEvent, RenderSupervisor};
use tokio::sync::broadcast;

/// Capacity of the event fan-out; slow SSE clients past this lag and skip.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub session_id: String,
    pub supervisor: Arc<RenderSupervisor>,
    pub events: broadcast::Sender<RenderEvent>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub desktop_mode: bool,
    pub markdown_to_html_override: bool,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        session_id: String,
        supervisor: Arc<RenderSupervisor>,
        events: broadcast::Sender<RenderEvent>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let config = &supervisor.services().config;
        let desktop_mode = config.desktop_mode;
        let markdown_to_html_override = config.markdown_to_html_override;
        Self {
            session_id,
            supervisor,
            events,
            shutdown_tx,
            desktop_mode,
            markdown_to_html_override,
            started_at: Instant::now(),
        }
    }

    pub fn environment(&self) -> &Arc<dyn RenderEnvironment> {
        &self.supervisor.services().environment
    }

    pub fn aliaser(&self) -> &Arc<dyn PathAliaser> {
        &self.supervisor.services().aliaser
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use super::job::{RenderJob, RenderRequest};
use super::services::Services;

/// Owns the single render slot. At most one job runs at a time; a start
/// request while one is running is rejected, not queued.
#[derive(Debug)]
pub struct RenderSupervisor {
    services: Arc<Services>,
    current: Mutex<Option<Arc<RenderJob>>>,
}

impl RenderSupervisor {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            current: Mutex::new(None),
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Start rendering `target_file`. Returns `false`, without side effects,
    /// when a render is already running. Requires a tokio runtime.
    pub fn start_render(
        &self,
        target_file: impl Into<PathBuf>,
        source_line: Option<u32>,
        encoding: &str,
    ) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|job| job.is_running()) {
            tracing::info!(target: "rmdrender.supervisor", "render already running, request rejected");
            return false;
        }

        let request = RenderRequest {
            target_file: target_file.into(),
            source_line,
            encoding: encoding.to_string(),
        };
        *current = Some(RenderJob::spawn(request, Arc::clone(&self.services)));
        true
    }

    /// Ask the running job, if any, to stop. Never waits for it.
    pub fn terminate_render(&self) {
        if let Some(job) = self.current_job().filter(|job| job.is_running()) {
            tracing::info!(
                target: "rmdrender.supervisor",
                target_file = %job.target_file().display(),
                "termination requested"
            );
            job.terminate();
        }
    }

    pub fn is_render_running(&self) -> bool {
        self.current_job().is_some_and(|job| job.is_running())
    }

    /// Most recently started job, running or finished.
    pub fn current_job(&self) -> Option<Arc<RenderJob>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

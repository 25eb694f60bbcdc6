use std::path::Path;
use std::sync::Arc;

use crate::config::RenderConfig;
use crate::environment::RenderEnvironment;
use crate::events::{EventSink, RenderCompleted};
use crate::paths::{HomeAliaser, PathAliaser};

/// Lookup of earlier uploads of a rendered artifact.
pub trait PublishRecords: Send + Sync {
    fn previous_upload_id(&self, output_file: &Path) -> Option<String>;
}

/// No upload history; every artifact reports as unpublished.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPublishRecords;

impl PublishRecords for NoPublishRecords {
    fn previous_upload_id(&self, _output_file: &Path) -> Option<String> {
        None
    }
}

/// Format-specific post-processing of a completion event, e.g. slide
/// navigation for presentation formats.
pub trait CompletionAmender: Send + Sync {
    /// Output format this amender applies to.
    fn format_name(&self) -> &str;

    fn amend(&self, target_file: &Path, source_line: Option<u32>, completed: &mut RenderCompleted);
}

/// Collaborators shared by every render job.
#[derive(Clone)]
pub struct Services {
    pub config: RenderConfig,
    pub environment: Arc<dyn RenderEnvironment>,
    pub aliaser: Arc<dyn PathAliaser>,
    pub publish_records: Arc<dyn PublishRecords>,
    pub amenders: Vec<Arc<dyn CompletionAmender>>,
    pub events: Arc<dyn EventSink>,
}

impl Services {
    pub fn new(
        config: RenderConfig,
        environment: Arc<dyn RenderEnvironment>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            environment,
            aliaser: Arc::new(HomeAliaser::new()),
            publish_records: Arc::new(NoPublishRecords),
            amenders: Vec::new(),
            events,
        }
    }

    pub fn with_aliaser(mut self, aliaser: Arc<dyn PathAliaser>) -> Self {
        self.aliaser = aliaser;
        self
    }

    pub fn with_publish_records(mut self, records: Arc<dyn PublishRecords>) -> Self {
        self.publish_records = records;
        self
    }

    pub fn with_amender(mut self, amender: Arc<dyn CompletionAmender>) -> Self {
        self.amenders.push(amender);
        self
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("config", &self.config)
            .field("amenders", &self.amenders.len())
            .finish_non_exhaustive()
    }
}

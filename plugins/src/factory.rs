use std::path::PathBuf;
use std::sync::Arc;

use rmdrender_core::api::{AppConfig, EventSink, HomeAliaser, PublishRecords, Services};

use crate::publish::JsonPublishRecords;
use crate::rscript::RscriptEnvironment;

pub fn build_environment(cfg: &AppConfig) -> Arc<RscriptEnvironment> {
    Arc::new(RscriptEnvironment::new(&cfg.render))
}

pub fn build_publish_records(cfg: &AppConfig) -> Option<Arc<dyn PublishRecords>> {
    let path = cfg
        .publish
        .records_file
        .as_ref()
        .map(PathBuf::from)
        .or_else(JsonPublishRecords::default_path)?;
    Some(Arc::new(JsonPublishRecords::new(path)))
}

/// Wire the concrete environment, aliaser and publish records into the
/// collaborators every render job uses.
pub fn build_services(cfg: &AppConfig, events: Arc<dyn EventSink>) -> Services {
    let mut services = Services::new(cfg.render.clone(), build_environment(cfg), events)
        .with_aliaser(Arc::new(HomeAliaser::new()));
    if let Some(records) = build_publish_records(cfg) {
        services = services.with_publish_records(records);
    }
    services
}

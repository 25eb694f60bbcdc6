//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `rmdrender_core::api` instead of reaching into internal modules.

pub use crate::config::{AppConfig, HttpServerConfig, LoggingConfig, PublishConfig, RenderConfig};
pub use crate::environment::{FormatName, OutputFormat, RenderEnvironment};
pub use crate::error::{ConfigError, EnvironmentError, ProcessError, ResolveError};
pub use crate::events::{
    EventSink, OutputKind, RenderCompleted, RenderEvent, RenderOutput, RenderStarted,
};
pub use crate::output::{
    output_url, requests_mathjax, resolve_output_request, OutputResource, OUTPUT_MOUNT,
};
pub use crate::paths::{HomeAliaser, PathAliaser};
pub use crate::process::{resolve_program, run_to_completion, CapturedOutput, ProcessSpec};
pub use crate::render::{
    r_string, CompletionAmender, JobState, NoPublishRecords, PublishRecords, RenderJob, RenderSupervisor,
    Services,
};
pub use crate::rewrite::MathjaxFilter;
pub use crate::source_type::{detect_source_type, RMARKDOWN_SOURCE_TYPE};

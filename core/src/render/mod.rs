//! Render jobs and the single-slot supervisor that owns them.
//!
//! A job is started on the tokio runtime and reports back exclusively through
//! the [`crate::events::EventSink`] held by its [`Services`]; callers never
//! await the interpreter.

mod completion;
mod job;
mod services;
mod supervisor;

pub use completion::{find_output_file, resolve_output_file, OutputBuffer, COMPLETION_MARKER};
pub use job::{r_string, render_command, JobState, RenderJob, RenderRequest};
pub use services::{CompletionAmender, NoPublishRecords, PublishRecords, Services};
pub use supervisor::RenderSupervisor;

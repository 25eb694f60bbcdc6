//! Events published by a render job.
//!
//! The job only sees an [`EventSink`]; how events reach a client (SSE, stdout,
//! a test channel) is decided by whoever builds the [`crate::render::Services`].

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::environment::OutputFormat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Normal,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderStarted {
    pub output_format: OutputFormat,
    pub target_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderCompleted {
    pub succeeded: bool,
    pub target_file: String,
    pub output_file: Option<String>,
    pub output_url: Option<String>,
    pub output_format: OutputFormat,
    pub preview_slide: i32,
    pub slide_navigation: Option<serde_json::Value>,
    pub rpubs_published: bool,
    /// Fields contributed by format-specific completion amenders.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RenderEvent {
    RenderStarted(RenderStarted),
    RenderOutput(RenderOutput),
    RenderCompleted(RenderCompleted),
}

impl RenderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RenderEvent::RenderStarted(_) => "render_started",
            RenderEvent::RenderOutput(_) => "render_output",
            RenderEvent::RenderCompleted(_) => "render_completed",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: RenderEvent);
}

impl EventSink for mpsc::UnboundedSender<RenderEvent> {
    fn publish(&self, event: RenderEvent) {
        if self.send(event).is_err() {
            tracing::debug!(target: "rmdrender.events", "event receiver dropped");
        }
    }
}

impl EventSink for broadcast::Sender<RenderEvent> {
    fn publish(&self, event: RenderEvent) {
        // No subscribers is normal when nobody is listening on the stream.
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = RenderEvent::RenderOutput(RenderOutput {
            kind: OutputKind::Error,
            output: "boom\n".into(),
        });
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "render_output");
        assert_eq!(json["data"]["type"], "error");
        assert_eq!(json["data"]["output"], "boom\n");
        assert_eq!(ev.name(), "render_output");
    }

    #[test]
    fn amender_fields_are_flattened() {
        let mut extra = serde_json::Map::new();
        extra.insert("slide_count".into(), serde_json::json!(12));
        let ev = RenderCompleted {
            succeeded: true,
            target_file: "~/a.Rmd".into(),
            output_file: Some("~/a.html".into()),
            output_url: Some("rmd_output/~%252Fa.html/".into()),
            output_format: OutputFormat::unknown(),
            preview_slide: -1,
            slide_navigation: None,
            rpubs_published: false,
            extra,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["slide_count"], 12);
        assert_eq!(json["preview_slide"], -1);
        assert!(json["slide_navigation"].is_null());
    }

    #[tokio::test]
    async fn channel_sinks_deliver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: &dyn EventSink = &tx;
        sink.publish(RenderEvent::RenderOutput(RenderOutput {
            kind: OutputKind::Normal,
            output: "x".into(),
        }));
        assert!(matches!(rx.recv().await, Some(RenderEvent::RenderOutput(_))));

        let (btx, mut brx) = broadcast::channel(4);
        let sink: &dyn EventSink = &btx;
        sink.publish(RenderEvent::RenderOutput(RenderOutput {
            kind: OutputKind::Normal,
            output: "y".into(),
        }));
        assert!(brx.recv().await.is_ok());
    }
}

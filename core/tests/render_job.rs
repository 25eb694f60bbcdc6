#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rmdrender_core::api::{
    CompletionAmender, EnvironmentError, FormatName, HomeAliaser, JobState, OutputFormat,
    OutputKind, PublishRecords, RenderCompleted, RenderConfig, RenderEnvironment, RenderEvent,
    RenderSupervisor, Services,
};
use tempfile::TempDir;
use tokio::sync::mpsc::{self, UnboundedReceiver};

struct FakeEnvironment {
    format: Option<OutputFormat>,
}

#[async_trait]
impl RenderEnvironment for FakeEnvironment {
    async fn output_format(
        &self,
        _target: &Path,
        _encoding: &str,
    ) -> Result<OutputFormat, EnvironmentError> {
        self.format.clone().ok_or(EnvironmentError::QueryFailed {
            code: 1,
            stderr: "there is no package called 'rmarkdown'".into(),
        })
    }

    async fn have_required_version(&self) -> bool {
        true
    }

    async fn mathjax_directory(&self) -> Option<PathBuf> {
        None
    }
}

struct Fixture {
    home: TempDir,
    events: UnboundedReceiver<RenderEvent>,
    supervisor: RenderSupervisor,
}

impl Fixture {
    fn target(&self) -> PathBuf {
        self.home.path().join("report.Rmd")
    }
}

fn html_format() -> OutputFormat {
    OutputFormat {
        format_name: FormatName::new("html_document"),
        format_options: serde_json::json!({"toc": true}),
    }
}

/// Install `body` as a fake `Rscript` and build a supervisor around it.
fn fixture_with(body: &str, customize: impl FnOnce(Services, &Path) -> Services) -> Fixture {
    let home = tempfile::tempdir().unwrap();
    std::fs::write(home.path().join("report.Rmd"), "---\ntitle: x\n---\n").unwrap();

    let script = home.path().join("fake-rscript");
    std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = RenderConfig {
        rscript: script.display().to_string(),
        ..RenderConfig::default()
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let services = Services::new(
        config,
        Arc::new(FakeEnvironment {
            format: Some(html_format()),
        }),
        Arc::new(tx),
    )
    .with_aliaser(Arc::new(HomeAliaser::with_home(home.path())));
    let services = customize(services, home.path());

    Fixture {
        home,
        events: rx,
        supervisor: RenderSupervisor::new(Arc::new(services)),
    }
}

fn fixture(body: &str) -> Fixture {
    fixture_with(body, |services, _| services)
}

async fn until_completed(rx: &mut UnboundedReceiver<RenderEvent>) -> Vec<RenderEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(20), rx.recv())
            .await
            .expect("render did not complete in time")
            .expect("event channel closed");
        let done = matches!(event, RenderEvent::RenderCompleted(_));
        events.push(event);
        if done {
            return events;
        }
    }
}

fn completion(events: &[RenderEvent]) -> &RenderCompleted {
    match events.last() {
        Some(RenderEvent::RenderCompleted(c)) => c,
        other => panic!("last event is not a completion: {other:?}"),
    }
}

fn output_text(events: &[RenderEvent], kind: OutputKind) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            RenderEvent::RenderOutput(o) if o.kind == kind => Some(o.output.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn successful_render_reports_output_file_and_url() {
    let mut fx = fixture(
        r#"echo "processing file: report.Rmd"
printf '%s\n' "$5" 1>&2
echo "<html></html>" > report.html
echo "Output created: report.html""#,
    );

    assert!(fx.supervisor.start_render(fx.target(), Some(3), "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    match &events[0] {
        RenderEvent::RenderStarted(started) => {
            assert_eq!(started.target_file, "~/report.Rmd");
            assert_eq!(started.output_format, html_format());
        }
        other => panic!("first event should be render_started, got {other:?}"),
    }
    assert!(output_text(&events, OutputKind::Normal).contains("processing file: report.Rmd"));
    assert!(output_text(&events, OutputKind::Error)
        .contains("rmarkdown::render('report.Rmd', encoding='UTF-8');"));

    let done = completion(&events);
    assert!(done.succeeded);
    assert_eq!(done.target_file, "~/report.Rmd");
    assert_eq!(done.output_file.as_deref(), Some("~/report.html"));
    assert_eq!(done.output_url.as_deref(), Some("rmd_output/~%252Freport.html/"));
    assert_eq!(done.preview_slide, -1);
    assert!(!done.rpubs_published);

    assert!(!fx.supervisor.is_render_running());
    let job = fx.supervisor.current_job().unwrap();
    assert_eq!(job.state(), JobState::Completed { success: true });
    assert!(job.has_output());
    assert_eq!(job.output_file(), Some(fx.home.path().join("report.html").as_path()));
}

#[tokio::test]
async fn nonzero_exit_fails_even_with_marker() {
    let mut fx = fixture(
        r#"echo "<html></html>" > report.html
echo "Output created: report.html"
echo "Error: pandoc document conversion failed" 1>&2
exit 1"#,
    );

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    let done = completion(&events);
    assert!(!done.succeeded);
    assert_eq!(done.output_file, None);
    assert_eq!(done.output_url, None);
    assert!(output_text(&events, OutputKind::Error).contains("pandoc document conversion failed"));
    assert!(!fx.supervisor.current_job().unwrap().has_output());
}

#[tokio::test]
async fn marker_naming_missing_file_fails() {
    let mut fx = fixture(r#"echo "Output created: nowhere.html""#);

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    let done = completion(&events);
    assert!(!done.succeeded);
    assert_eq!(done.output_file, None);
}

#[tokio::test]
async fn absolute_marker_path_is_used_as_is() {
    let out_dir = tempfile::tempdir().unwrap();
    let out = out_dir.path().join("elsewhere.pdf");
    let mut fx = fixture(&format!(
        "echo pdf > '{0}'\necho 'Output created: {0}'",
        out.display()
    ));

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    let done = completion(&events);
    assert!(done.succeeded);
    assert_eq!(done.output_file.as_deref(), Some(out.to_str().unwrap()));
}

#[tokio::test]
async fn second_start_is_rejected_until_termination() {
    let mut fx = fixture("echo started\nsleep 30\necho 'Output created: report.html'");

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    assert!(fx.supervisor.is_render_running());
    assert!(!fx.supervisor.start_render(fx.target(), None, "UTF-8"));

    // Wait until the interpreter is actually producing output.
    loop {
        match fx.events.recv().await {
            Some(RenderEvent::RenderOutput(_)) => break,
            Some(_) => continue,
            None => panic!("event channel closed"),
        }
    }
    let first_job = fx.supervisor.current_job().unwrap();

    fx.supervisor.terminate_render();
    let events = until_completed(&mut fx.events).await;

    let done = completion(&events);
    assert!(!done.succeeded);
    assert_eq!(done.output_file, None);
    assert_eq!(first_job.state(), JobState::Terminated);
    assert!(!fx.supervisor.is_render_running());
}

#[tokio::test]
async fn new_render_may_start_after_completion() {
    let mut fx = fixture("echo done");

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    until_completed(&mut fx.events).await;
    let first = fx.supervisor.current_job().unwrap();

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    until_completed(&mut fx.events).await;
    let second = fx.supervisor.current_job().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn background_helper_does_not_keep_the_slot_busy() {
    let mut fx = fixture(
        "sleep 30 &\necho '<html></html>' > report.html\necho 'Output created: report.html'",
    );

    let started = std::time::Instant::now();
    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(completion(&events).succeeded);
    assert!(output_text(&events, OutputKind::Normal).contains("Output created: report.html"));
    assert!(!fx.supervisor.is_render_running());
    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    until_completed(&mut fx.events).await;
}

#[tokio::test]
async fn terminate_when_idle_is_a_noop() {
    let mut fx = fixture("echo unused");

    fx.supervisor.terminate_render();
    assert!(!fx.supervisor.is_render_running());
    assert!(fx.supervisor.current_job().is_none());
    assert!(fx.events.try_recv().is_err());
}

#[tokio::test]
async fn missing_interpreter_reports_launch_failure() {
    let mut fx = fixture_with("", |mut services, _| {
        services.config.rscript = "/nonexistent/bin/Rscript".into();
        services
    });

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    assert_eq!(events.len(), 3, "{events:?}");
    assert!(matches!(events[0], RenderEvent::RenderStarted(_)));
    let message = output_text(&events, OutputKind::Error);
    assert!(
        message.starts_with("Error rendering R Markdown for ~/report.Rmd "),
        "{message}"
    );
    assert!(message.contains("/nonexistent/bin/Rscript"));
    assert!(!completion(&events).succeeded);
    assert_eq!(
        fx.supervisor.current_job().unwrap().state(),
        JobState::Completed { success: false }
    );
}

#[tokio::test]
async fn format_discovery_failure_uses_unknown_format() {
    let mut fx = fixture_with("echo ok", |mut services, _| {
        services.environment = Arc::new(FakeEnvironment { format: None });
        services
    });

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    match &events[0] {
        RenderEvent::RenderStarted(started) => {
            assert_eq!(started.output_format, OutputFormat::unknown())
        }
        other => panic!("unexpected first event {other:?}"),
    }
    let json = serde_json::to_value(completion(&events)).unwrap();
    assert!(json["output_format"]["format_name"].is_null());
}

#[tokio::test]
async fn pandoc_path_is_exported() {
    let mut fx = fixture_with(r#"echo "pandoc=$RSTUDIO_PANDOC""#, |mut services, _| {
        services.config.pandoc_path = Some("/opt/pandoc/bin".into());
        services
    });

    assert!(fx.supervisor.start_render(fx.target(), None, "UTF-8"));
    let events = until_completed(&mut fx.events).await;
    assert!(output_text(&events, OutputKind::Normal).contains("pandoc=/opt/pandoc/bin"));
}

struct KnownUploads(PathBuf);

impl PublishRecords for KnownUploads {
    fn previous_upload_id(&self, output_file: &Path) -> Option<String> {
        (output_file == self.0).then(|| "https://rpubs.com/ada/1".to_string())
    }
}

struct SlideCount;

impl CompletionAmender for SlideCount {
    fn format_name(&self) -> &str {
        "html_document"
    }

    fn amend(&self, _target: &Path, source_line: Option<u32>, completed: &mut RenderCompleted) {
        completed.preview_slide = source_line.map_or(-1, |l| l as i32);
        completed
            .extra
            .insert("slide_count".into(), serde_json::json!(4));
    }
}

struct NeverMatches;

impl CompletionAmender for NeverMatches {
    fn format_name(&self) -> &str {
        "ioslides_presentation"
    }

    fn amend(&self, _target: &Path, _line: Option<u32>, completed: &mut RenderCompleted) {
        completed.extra.insert("unexpected".into(), serde_json::json!(true));
    }
}

#[tokio::test]
async fn publish_records_and_amenders_shape_completion() {
    let mut fx = fixture_with(
        "echo '<html></html>' > report.html\necho 'Output created: report.html'",
        |services, home| {
            services
                .with_publish_records(Arc::new(KnownUploads(home.join("report.html"))))
                .with_amender(Arc::new(SlideCount))
                .with_amender(Arc::new(NeverMatches))
        },
    );

    assert!(fx.supervisor.start_render(fx.target(), Some(7), "UTF-8"));
    let events = until_completed(&mut fx.events).await;

    let done = completion(&events);
    assert!(done.succeeded);
    assert!(done.rpubs_published);
    assert_eq!(done.preview_slide, 7);
    let json = serde_json::to_value(done).unwrap();
    assert_eq!(json["slide_count"], 4);
    assert!(json.get("unexpected").is_none());
}

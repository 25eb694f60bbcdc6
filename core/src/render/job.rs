use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use encoding_rs::{CoderResult, Decoder, Encoding, UTF_8};
use serde::Serialize;

use crate::environment::{FormatName, OutputFormat};
use crate::error::ProcessError;
use crate::events::{EventSink, OutputKind, RenderCompleted, RenderEvent, RenderOutput, RenderStarted};
use crate::output::output_url;
use crate::process::{resolve_program, run_program, CancelFlag, ProcessCallbacks, ProcessSpec};

use super::completion::{resolve_output_file, OutputBuffer};
use super::services::Services;

const PANDOC_ENV: &str = "RSTUDIO_PANDOC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Absolute path of the document to render.
    pub target_file: PathBuf,
    pub source_line: Option<u32>,
    pub encoding: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobState {
    Running,
    Completed { success: bool },
    Terminated,
}

/// One invocation of the renderer for one document.
#[derive(Debug)]
pub struct RenderJob {
    target_file: PathBuf,
    source_line: Option<u32>,
    encoding: String,
    state: Mutex<JobState>,
    cancel: CancelFlag,
    output_format: OnceLock<OutputFormat>,
    output_file: OnceLock<PathBuf>,
}

/// Expression handed to `Rscript -e`. The interpreter runs in the document's
/// directory, so only the file name is passed.
pub fn render_command(file_name: &str, encoding: &str) -> String {
    format!(
        "rmarkdown::render({}, encoding={});",
        r_string(file_name),
        r_string(encoding)
    )
}

/// Single-quoted R string literal.
pub fn r_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl RenderJob {
    /// Create the job in the `Running` state and drive it on a spawned task.
    /// Must be called from within a tokio runtime.
    pub fn spawn(request: RenderRequest, services: Arc<Services>) -> Arc<Self> {
        let job = Arc::new(Self {
            target_file: request.target_file,
            source_line: request.source_line,
            encoding: request.encoding,
            state: Mutex::new(JobState::Running),
            cancel: CancelFlag::new(),
            output_format: OnceLock::new(),
            output_file: OnceLock::new(),
        });

        let task_job = Arc::clone(&job);
        tokio::spawn(async move {
            task_job.run(&services).await;
        });
        job
    }

    pub fn target_file(&self) -> &Path {
        &self.target_file
    }

    pub fn source_line(&self) -> Option<u32> {
        self.source_line
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.state() == JobState::Running
    }

    /// Resolved once the job has queried the environment.
    pub fn output_format(&self) -> Option<&OutputFormat> {
        self.output_format.get()
    }

    /// Set only when the render succeeded.
    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.get().map(PathBuf::as_path)
    }

    pub fn has_output(&self) -> bool {
        !self.is_running() && self.output_file().is_some_and(Path::exists)
    }

    /// Request cooperative termination; observed at the next poll of the
    /// process loop.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    async fn run(&self, services: &Services) {
        let format = match services
            .environment
            .output_format(&self.target_file, &self.encoding)
            .await
        {
            Ok(format) => format,
            Err(e) => {
                tracing::error!(
                    target: "rmdrender.render",
                    target_file = %self.target_file.display(),
                    error = %e,
                    "output format discovery failed"
                );
                OutputFormat::unknown()
            }
        };
        let _ = self.output_format.set(format.clone());

        services.events.publish(RenderEvent::RenderStarted(RenderStarted {
            output_format: format,
            target_file: services.aliaser.alias(&self.target_file),
        }));

        let spec = match self.process_spec(services) {
            Ok(spec) => spec,
            Err(e) => return self.fail_to_launch(services, &e),
        };

        tracing::info!(
            target: "rmdrender.render",
            target_file = %self.target_file.display(),
            encoding = %self.encoding,
            "render started"
        );

        let encoding = Encoding::for_label(self.encoding.as_bytes()).unwrap_or(UTF_8);
        let mut callbacks = JobCallbacks {
            cancel: &self.cancel,
            events: services.events.as_ref(),
            buffer: OutputBuffer::new(),
            stdout: encoding.new_decoder(),
            stderr: encoding.new_decoder(),
        };

        let exit = match run_program(&spec, &mut callbacks).await {
            Ok(exit) => exit,
            Err(e) => return self.fail_to_launch(services, &e),
        };
        callbacks.flush();
        let buffer = callbacks.buffer;

        if exit.terminated || self.cancel.is_cancelled() {
            tracing::info!(target: "rmdrender.render", target_file = %self.target_file.display(), "render terminated");
            self.finish(services, JobState::Terminated);
            return;
        }

        let produced = buffer
            .output_file_name()
            .map(|name| resolve_output_file(name, self.target_dir()));
        let success = exit.exit_code == 0 && produced.as_deref().is_some_and(Path::exists);
        if success {
            if let Some(file) = produced {
                let _ = self.output_file.set(file);
            }
        }

        tracing::info!(
            target: "rmdrender.render",
            target_file = %self.target_file.display(),
            exit_code = exit.exit_code,
            output_file = ?self.output_file(),
            success,
            "render finished"
        );
        self.finish(services, JobState::Completed { success });
    }

    fn target_dir(&self) -> &Path {
        self.target_file.parent().unwrap_or_else(|| Path::new("."))
    }

    fn process_spec(&self, services: &Services) -> Result<ProcessSpec, ProcessError> {
        let program = resolve_program(&services.config.rscript)?;
        let file_name = self
            .target_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut spec = ProcessSpec::new(program);
        spec.args = vec![
            "--slave".into(),
            "--no-save".into(),
            "--no-restore".into(),
            "-e".into(),
            render_command(&file_name, &self.encoding),
        ];
        spec.working_dir = Some(self.target_dir().to_path_buf());
        if let Some(pandoc) = &services.config.pandoc_path {
            spec.envs.push((PANDOC_ENV.to_string(), pandoc.clone()));
        }
        spec.terminate_children = true;
        Ok(spec)
    }

    fn fail_to_launch(&self, services: &Services, error: &ProcessError) {
        tracing::error!(
            target: "rmdrender.render",
            target_file = %self.target_file.display(),
            error = %error.summary(),
            "render could not be launched"
        );
        services.events.publish(RenderEvent::RenderOutput(RenderOutput {
            kind: OutputKind::Error,
            output: format!(
                "Error rendering R Markdown for {} {}",
                services.aliaser.alias(&self.target_file),
                error.summary()
            ),
        }));
        self.finish(services, JobState::Completed { success: false });
    }

    /// Leave `Running`, then publish the completion so that a client reacting
    /// to it can start the next render immediately.
    fn finish(&self, services: &Services, state: JobState) {
        {
            let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != JobState::Running {
                return;
            }
            *current = state;
        }
        let succeeded = matches!(state, JobState::Completed { success: true });
        services
            .events
            .publish(RenderEvent::RenderCompleted(self.completed_event(services, succeeded)));
    }

    fn completed_event(&self, services: &Services, succeeded: bool) -> RenderCompleted {
        let output_format = self.output_format.get().cloned().unwrap_or_default();
        let output_file = self.output_file.get();
        let aliased_output = output_file.map(|path| services.aliaser.alias(path));

        let rpubs_published = output_file
            .filter(|path| is_html(path))
            .is_some_and(|path| services.publish_records.previous_upload_id(path).is_some());

        let mut completed = RenderCompleted {
            succeeded,
            target_file: services.aliaser.alias(&self.target_file),
            output_url: aliased_output.as_deref().map(output_url),
            output_file: aliased_output,
            output_format,
            preview_slide: -1,
            slide_navigation: None,
            rpubs_published,
            extra: serde_json::Map::new(),
        };

        if let FormatName::Named(name) = &completed.output_format.format_name {
            let name = name.clone();
            for amender in services.amenders.iter().filter(|a| a.format_name() == name) {
                amender.amend(&self.target_file, self.source_line, &mut completed);
            }
        }
        completed
    }
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html"))
}

struct JobCallbacks<'a> {
    cancel: &'a CancelFlag,
    events: &'a dyn EventSink,
    buffer: OutputBuffer,
    stdout: Decoder,
    stderr: Decoder,
}

impl JobCallbacks<'_> {
    fn emit(&mut self, kind: OutputKind, text: String) {
        if text.is_empty() {
            return;
        }
        self.buffer.append(&text);
        self.events
            .publish(RenderEvent::RenderOutput(RenderOutput { kind, output: text }));
    }

    /// Emit bytes still held by the decoders, such as a truncated final
    /// multi-byte sequence.
    fn flush(&mut self) {
        let out = decode(&mut self.stdout, &[], true);
        self.emit(OutputKind::Normal, out);
        let err = decode(&mut self.stderr, &[], true);
        self.emit(OutputKind::Error, err);
    }
}

impl ProcessCallbacks for JobCallbacks<'_> {
    fn on_continue(&mut self) -> bool {
        !self.cancel.is_cancelled()
    }

    fn on_stdout(&mut self, chunk: &[u8]) {
        let text = decode(&mut self.stdout, chunk, false);
        self.emit(OutputKind::Normal, text);
    }

    fn on_stderr(&mut self, chunk: &[u8]) {
        let text = decode(&mut self.stderr, chunk, false);
        self.emit(OutputKind::Error, text);
    }

    fn on_exit(&mut self, exit_code: i32) {
        tracing::debug!(target: "rmdrender.render", exit_code, "renderer exited");
    }
}

fn decode(decoder: &mut Decoder, mut input: &[u8], last: bool) -> String {
    let capacity = decoder
        .max_utf8_buffer_length(input.len())
        .unwrap_or(input.len() * 3 + 16);
    let mut out = String::with_capacity(capacity);
    loop {
        let (result, read, _) = decoder.decode_to_string(input, &mut out, last);
        input = &input[read..];
        match result {
            CoderResult::InputEmpty => return out,
            CoderResult::OutputFull => out.reserve(input.len() * 3 + 16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_command_quotes_file_name() {
        assert_eq!(
            render_command("report.Rmd", "UTF-8"),
            "rmarkdown::render('report.Rmd', encoding='UTF-8');"
        );
        assert_eq!(
            render_command("it's a\\test.Rmd", "UTF-8"),
            "rmarkdown::render('it\\'s a\\\\test.Rmd', encoding='UTF-8');"
        );
    }

    #[test]
    fn decoder_keeps_split_multibyte_sequences() {
        let mut decoder = UTF_8.new_decoder();
        let bytes = "héllo".as_bytes();
        let first = decode(&mut decoder, &bytes[..2], false);
        let second = decode(&mut decoder, &bytes[2..], false);
        assert_eq!(first, "h");
        assert_eq!(second, "éllo");
    }

    #[test]
    fn legacy_encodings_are_decoded() {
        let encoding = Encoding::for_label(b"ISO-8859-1").unwrap_or(UTF_8);
        let mut decoder = encoding.new_decoder();
        assert_eq!(decode(&mut decoder, &[0x63, 0x61, 0x66, 0xE9], true), "café");
    }

    #[test]
    fn html_extension_is_case_insensitive() {
        assert!(is_html(Path::new("/a/report.HTML")));
        assert!(is_html(Path::new("/a/report.html")));
        assert!(!is_html(Path::new("/a/report.pdf")));
    }
}

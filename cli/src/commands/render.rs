use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rmdrender_core::api::{AppConfig, OutputKind, RenderEvent, RenderSupervisor};
use rmdrender_plugins::factory::build_services;
use tokio::sync::mpsc;

use crate::commands::cli::{EventFormat, RenderArgs};

/// Render once in the foreground. Exit code 0 only when the render succeeded.
pub async fn handle_render(args: RenderArgs, cfg: AppConfig) -> Result<i32> {
    let target = std::fs::canonicalize(&args.file)
        .with_context(|| format!("document not found: {}", args.file.display()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let services = build_services(&cfg, Arc::new(tx));
    let supervisor = RenderSupervisor::new(Arc::new(services));
    if !supervisor.start_render(&target, u32::try_from(args.line).ok(), &args.encoding) {
        bail!("a render is already running");
    }

    let mut interrupted = false;
    loop {
        let event = tokio::select! {
            event = rx.recv() => event,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                tracing::info!(target: "rmdrender.render", "interrupted, stopping render");
                interrupted = true;
                supervisor.terminate_render();
                continue;
            }
        };
        let Some(event) = event else {
            bail!("render task ended without completing");
        };

        print_event(&event, args.format)?;
        if let RenderEvent::RenderCompleted(done) = &event {
            return Ok(if done.succeeded { 0 } else { 1 });
        }
    }
}

fn print_event(event: &RenderEvent, format: EventFormat) -> Result<()> {
    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    match format {
        EventFormat::Jsonl => {
            let mut out = stdout.lock();
            writeln!(out, "{}", serde_json::to_string(event)?)?;
            out.flush()?;
        }
        EventFormat::Text => match event {
            RenderEvent::RenderOutput(output) if output.kind == OutputKind::Error => {
                let mut err = stderr.lock();
                err.write_all(output.output.as_bytes())?;
                err.flush()?;
            }
            other => {
                if let Some(line) = text_line(other) {
                    let mut out = stdout.lock();
                    out.write_all(line.as_bytes())?;
                    out.flush()?;
                }
            }
        },
    }
    Ok(())
}

/// Human-readable form of an event for `--format text`.
fn text_line(event: &RenderEvent) -> Option<String> {
    match event {
        RenderEvent::RenderStarted(started) => Some(format!(
            "==> Rendering {} ({})\n",
            started.target_file,
            started
                .output_format
                .format_name
                .as_str()
                .unwrap_or("unknown format")
        )),
        RenderEvent::RenderOutput(output) => Some(output.output.clone()),
        RenderEvent::RenderCompleted(done) => Some(match (&done.output_file, done.succeeded) {
            (Some(file), true) => format!("==> Rendered {file}\n"),
            _ => format!("==> Render of {} failed\n", done.target_file),
        }),
    }
}

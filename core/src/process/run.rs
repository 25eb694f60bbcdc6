use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::time::MissedTickBehavior;

use crate::error::ProcessError;

use super::children::{descendants_of, kill_descendants, kill_recorded};
use super::exit::normalize_exit;

/// Upper bound between two `on_continue` checks while the process is quiet.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long output is still read once the process has exited. A descendant
/// that inherited the pipes can otherwise hold them open indefinitely.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Cadence of the descendant snapshot used to clean up after exit.
const DESCENDANT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub envs: Vec<(String, String)>,
    /// Also kill processes spawned by the program when it is terminated or
    /// its handle is dropped before exit.
    pub terminate_children: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            envs: Vec::new(),
            terminate_children: true,
        }
    }
}

pub trait ProcessCallbacks: Send {
    /// Polled once per loop iteration; `false` stops the process.
    fn on_continue(&mut self) -> bool {
        true
    }

    fn on_stdout(&mut self, chunk: &[u8]);

    fn on_stderr(&mut self, chunk: &[u8]);

    fn on_exit(&mut self, exit_code: i32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub exit_code: i32,
    /// The process was stopped because `on_continue` returned `false`.
    pub terminated: bool,
}

/// Resolve a bare program name on `PATH`, or check that an explicit path is
/// executable.
pub fn resolve_program(program: &str) -> Result<PathBuf, ProcessError> {
    which::which(program).map_err(|source| ProcessError::InterpreterNotFound {
        program: program.to_string(),
        source,
    })
}

enum Step {
    Stdout(std::io::Result<usize>),
    Stderr(std::io::Result<usize>),
    Exited(std::io::Result<std::process::ExitStatus>),
    Tick,
}

pub async fn run_program(
    spec: &ProcessSpec,
    callbacks: &mut dyn ProcessCallbacks,
) -> Result<ProcessExit, ProcessError> {
    let program = spec.program.display().to_string();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }
    for (key, value) in &spec.envs {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;
    let mut guard = DescendantGuard::new(child.id(), spec.terminate_children);

    tracing::debug!(
        target: "rmdrender.process",
        program = %program,
        pid = ?child.id(),
        cwd = ?spec.working_dir,
        "process started"
    );

    let root_pid = child.id();
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = vec![0u8; READ_CHUNK];
    let mut err_buf = vec![0u8; READ_CHUNK];

    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut recorded: Vec<u32> = Vec::new();
    let mut last_scan = tokio::time::Instant::now();

    loop {
        if !callbacks.on_continue() {
            tracing::info!(target: "rmdrender.process", program = %program, "termination requested, stopping process");
            drop(stdout.take());
            drop(stderr.take());
            let exit_code = terminate(&mut child, spec.terminate_children, &program).await?;
            guard.disarm();
            callbacks.on_exit(exit_code);
            return Ok(ProcessExit {
                exit_code,
                terminated: true,
            });
        }

        let step = tokio::select! {
            res = read_chunk(stdout.as_mut(), &mut out_buf), if stdout.is_some() => Step::Stdout(res),
            res = read_chunk(stderr.as_mut(), &mut err_buf), if stderr.is_some() => Step::Stderr(res),
            status = child.wait() => Step::Exited(status),
            _ = poll.tick() => Step::Tick,
        };

        match step {
            Step::Stdout(res) => {
                if !forward(res, &out_buf, "stdout", &mut |c| callbacks.on_stdout(c)) {
                    stdout = None;
                }
            }
            Step::Stderr(res) => {
                if !forward(res, &err_buf, "stderr", &mut |c| callbacks.on_stderr(c)) {
                    stderr = None;
                }
            }
            Step::Exited(status) => {
                guard.disarm();
                let status = status.map_err(|source| ProcessError::Wait {
                    program: program.clone(),
                    source,
                })?;
                let exit_code = normalize_exit(status);
                tracing::debug!(target: "rmdrender.process", program = %program, exit_code, "process exited");

                let drained = drain(
                    &mut stdout,
                    &mut stderr,
                    &mut out_buf,
                    &mut err_buf,
                    callbacks,
                )
                .await;
                if !drained {
                    tracing::debug!(target: "rmdrender.process", program = %program, "pipes held open by descendants after exit");
                    if let (true, Some(root)) = (spec.terminate_children, root_pid) {
                        let pids = std::mem::take(&mut recorded);
                        let _ = tokio::task::spawn_blocking(move || kill_recorded(root, &pids)).await;
                    }
                }
                callbacks.on_exit(exit_code);
                return Ok(ProcessExit {
                    exit_code,
                    terminated: false,
                });
            }
            Step::Tick => {
                if let (true, Some(root)) = (spec.terminate_children, root_pid) {
                    if last_scan.elapsed() >= DESCENDANT_SCAN_INTERVAL {
                        last_scan = tokio::time::Instant::now();
                        recorded = tokio::task::spawn_blocking(move || descendants_of(root))
                            .await
                            .unwrap_or_default();
                    }
                }
            }
        }
    }
}

/// Hand one read result to `emit`; `false` once the stream is finished.
fn forward(
    res: std::io::Result<usize>,
    buf: &[u8],
    stream: &'static str,
    emit: &mut dyn FnMut(&[u8]),
) -> bool {
    match res {
        Ok(0) => false,
        Ok(n) => {
            emit(&buf[..n]);
            true
        }
        Err(e) => {
            tracing::warn!(target: "rmdrender.process", error = %e, stream, "read failed");
            false
        }
    }
}

/// Deliver what is left in the pipes after exit, bounded by
/// [`EXIT_DRAIN_GRACE`]. `false` when a pipe was still open at the deadline.
async fn drain(
    stdout: &mut Option<ChildStdout>,
    stderr: &mut Option<ChildStderr>,
    out_buf: &mut [u8],
    err_buf: &mut [u8],
    callbacks: &mut dyn ProcessCallbacks,
) -> bool {
    let deadline = tokio::time::Instant::now() + EXIT_DRAIN_GRACE;
    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            res = read_chunk(stdout.as_mut(), out_buf), if stdout.is_some() => {
                if !forward(res, out_buf, "stdout", &mut |c| callbacks.on_stdout(c)) {
                    *stdout = None;
                }
            }
            res = read_chunk(stderr.as_mut(), err_buf), if stderr.is_some() => {
                if !forward(res, err_buf, "stderr", &mut |c| callbacks.on_stderr(c)) {
                    *stderr = None;
                }
            }
            _ = tokio::time::sleep_until(deadline) => return false,
        }
    }
    true
}

async fn read_chunk<R>(reader: Option<&mut R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn terminate(
    child: &mut Child,
    terminate_children: bool,
    program: &str,
) -> Result<i32, ProcessError> {
    if terminate_children {
        if let Some(pid) = child.id() {
            let _ = tokio::task::spawn_blocking(move || kill_descendants(pid)).await;
        }
    }
    if let Err(e) = child.start_kill() {
        // Already exited between the check and the kill.
        tracing::debug!(target: "rmdrender.process", error = %e, "kill failed");
    }
    let status = child.wait().await.map_err(|source| ProcessError::Wait {
        program: program.to_string(),
        source,
    })?;
    Ok(normalize_exit(status))
}

/// Sweeps descendants if the run future is dropped while the process is still
/// alive; `kill_on_drop` only covers the direct child.
struct DescendantGuard {
    pid: Option<u32>,
}

impl DescendantGuard {
    fn new(pid: Option<u32>, enabled: bool) -> Self {
        Self {
            pid: pid.filter(|_| enabled),
        }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for DescendantGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_descendants(pid);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Run `spec` to exit, buffering both streams. Meant for short queries, not
/// for render jobs whose output must be streamed.
pub async fn run_to_completion(spec: &ProcessSpec) -> Result<CapturedOutput, ProcessError> {
    #[derive(Default)]
    struct Collect(CapturedOutput);

    impl ProcessCallbacks for Collect {
        fn on_stdout(&mut self, chunk: &[u8]) {
            self.0.stdout.extend_from_slice(chunk);
        }
        fn on_stderr(&mut self, chunk: &[u8]) {
            self.0.stderr.extend_from_slice(chunk);
        }
        fn on_exit(&mut self, exit_code: i32) {
            self.0.exit_code = exit_code;
        }
    }

    let mut collect = Collect::default();
    run_program(spec, &mut collect).await?;
    Ok(collect.0)
}

use crate::data::{RenderFailure, RenderResult};
use std::future::{self, Future};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_ENGINE: &str = "manim";
/// High quality, no preview window
pub const DEFAULT_QUALITY_FLAG: &str = "-qh";
pub const DEFAULT_MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// How long to keep draining output after the engine was killed
const DRAIN_GRACE: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 8192;

/// Forces UTF-8 text I/O in the (Python) engine regardless of host locale
const UTF8_ENV: [(&str, &str); 2] = [("PYTHONIOENCODING", "utf-8"), ("PYTHONUTF8", "1")];

#[derive(Debug, Error)]
pub enum EngineCommandError {
    #[error("engine command could not be parsed: {0}")]
    Parse(#[from] shell_words::ParseError),
    #[error("engine command is empty")]
    Empty,
}

/// Output captured from one stream, keeping only the most recent bytes
#[derive(Debug, Default)]
struct Captured {
    text: String,
    truncated: bool,
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    TimedOut(Duration),
    Cancelled,
}

/// Runs the external rendering engine against a generated source file.
///
/// The engine is invoked as `<program> [leading args] <quality flag> <source> <scene>`.
#[derive(Debug, Clone)]
pub struct Renderer {
    program: String,
    leading_args: Vec<String>,
    quality_flag: String,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    max_capture_bytes: usize,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE, Vec::new())
    }
}

impl Renderer {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
            quality_flag: DEFAULT_QUALITY_FLAG.to_string(),
            working_dir: None,
            timeout: None,
            max_capture_bytes: DEFAULT_MAX_CAPTURE_BYTES,
        }
    }

    /// Builds a renderer from a shell-style engine command such as `python -m manim`
    pub fn from_command_line(engine: &str) -> Result<Self, EngineCommandError> {
        let mut words = shell_words::split(engine)?;
        if words.is_empty() {
            return Err(EngineCommandError::Empty);
        }
        let program = words.remove(0);
        Ok(Self::new(program, words))
    }

    pub fn with_quality_flag(mut self, flag: impl Into<String>) -> Self {
        self.quality_flag = flag.into();
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Kill the engine if it runs longer than `timeout` (`None` waits forever)
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_capture_bytes(mut self, bytes: usize) -> Self {
        self.max_capture_bytes = bytes.max(1);
        self
    }

    /// Full argument vector for rendering `scene_name` from `source`
    pub fn command_line(&self, source: &Path, scene_name: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.leading_args.len() + 4);
        argv.push(self.program.clone());
        argv.extend(self.leading_args.iter().cloned());
        argv.push(self.quality_flag.clone());
        argv.push(source.to_string_lossy().into_owned());
        argv.push(scene_name.to_string());
        argv
    }

    /// Renders until the engine exits or the configured deadline passes
    pub async fn render(&self, source: &Path, scene_name: &str) -> RenderResult {
        self.render_until(source, scene_name, future::pending()).await
    }

    /// Like [`render`](Self::render), but also stops when `cancel` completes.
    ///
    /// Stopping kills the engine; whatever output was captured up to that
    /// point is reported in the result.
    #[instrument(skip(self, cancel), fields(program = %self.program))]
    pub async fn render_until<F>(&self, source: &Path, scene_name: &str, cancel: F) -> RenderResult
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let argv = self.command_line(source, scene_name);
        info!(command = %shell_words::join(&argv), "Starting render");

        let mut command = Command::new(&self.program);
        command
            .args(&argv[1..])
            .envs(UTF8_ENV)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "render error: engine could not be started");
                return RenderResult::failed(
                    RenderFailure::Spawn,
                    format!("failed to start '{}': {}", self.program, e),
                    None,
                    String::new(),
                    started.elapsed(),
                );
            }
        };

        let capture_limit = self.max_capture_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(capture(out, capture_limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, capture_limit)));

        let deadline = async {
            match self.timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => future::pending().await,
            }
        };

        let waited = tokio::select! {
            status = child.wait() => Waited::Exited(status),
            limit = deadline => Waited::TimedOut(limit),
            _ = cancel => Waited::Cancelled,
        };

        if !matches!(waited, Waited::Exited(_)) {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill engine");
            }
        }

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;
        if stdout.truncated || stderr.truncated {
            debug!(capture_limit, "Engine output exceeded capture limit; kept the tail");
        }
        let duration = started.elapsed();

        match waited {
            Waited::Exited(Ok(status)) if status.success() => {
                info!(elapsed = ?duration, "animation render success");
                RenderResult::succeeded(status.code(), stdout.text, duration)
            }
            Waited::Exited(Ok(status)) => {
                error!(code = ?status.code(), stderr = %stderr.text, "render error");
                RenderResult::failed(
                    RenderFailure::NonZeroExit(status.code()),
                    stderr.text,
                    status.code(),
                    stdout.text,
                    duration,
                )
            }
            Waited::Exited(Err(e)) => {
                error!(error = %e, "render error: failed to wait for engine");
                RenderResult::failed(RenderFailure::Io, e.to_string(), None, stdout.text, duration)
            }
            Waited::TimedOut(limit) => {
                let failure = RenderFailure::TimedOut(limit);
                error!(%failure, "render error");
                let diagnostic = with_stderr(failure.to_string(), &stderr.text);
                RenderResult::failed(failure, diagnostic, None, stdout.text, duration)
            }
            Waited::Cancelled => {
                warn!("Render cancelled; engine killed");
                let failure = RenderFailure::Cancelled;
                let diagnostic = with_stderr(failure.to_string(), &stderr.text);
                RenderResult::failed(failure, diagnostic, None, stdout.text, duration)
            }
        }
    }
}

fn with_stderr(message: String, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        message
    } else {
        format!("{}\n{}", message, stderr)
    }
}

/// Reads a stream to the end, keeping at most `limit` trailing bytes
async fn capture<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> Captured {
    let mut kept: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                // Compact lazily so large outputs are not shifted on every chunk
                if kept.len() > limit.saturating_mul(2) {
                    drop_front(&mut kept, limit);
                    truncated = true;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read engine output");
                break;
            }
        }
    }

    if kept.len() > limit {
        drop_front(&mut kept, limit);
        truncated = true;
    }

    Captured {
        text: String::from_utf8_lossy(&kept).into_owned(),
        truncated,
    }
}

/// Drops leading bytes so at most `limit` remain, cutting on a UTF-8 boundary
fn drop_front(kept: &mut Vec<u8>, limit: usize) {
    let mut cut = kept.len().saturating_sub(limit);
    // Skip continuation bytes (0b10xxxxxx) of a character split by the cut
    while cut < kept.len() && kept[cut] & 0xC0 == 0x80 {
        cut += 1;
    }
    kept.drain(..cut);
}

async fn collect(task: Option<JoinHandle<Captured>>) -> Captured {
    let Some(mut task) = task else {
        return Captured::default();
    };

    match tokio::time::timeout(DRAIN_GRACE, &mut task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!(error = %e, "Output capture task failed");
            Captured::default()
        }
        Err(_) => {
            warn!("Engine output still open after kill; abandoning capture");
            task.abort();
            Captured::default()
        }
    }
}

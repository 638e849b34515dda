//! Encoding engine backends and subprocess supervision.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use mixdown_common::config::EngineConfig;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::progress::DiagnosticTail;

const READ_CHUNK_BYTES: usize = 8192;

/// An external encoding engine that consumes an argument list.
///
/// The render job owns the spawned process; a backend only decides which
/// program runs and how it is invoked.
pub trait EncoderBackend: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether the engine can be launched on this system.
    fn is_available(&self) -> bool;

    /// A command that runs the engine with `args`.
    fn command(&self, args: &[String]) -> tokio::process::Command;
}

/// The ffmpeg command-line encoder.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.binary.clone())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl EncoderBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        if self.binary.contains('/') {
            Path::new(&self.binary).is_file()
        } else {
            find_in_path(&self.binary).is_some()
        }
    }

    fn command(&self, args: &[String]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(args);
        cmd
    }
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_in_dirs(std::env::split_paths(&path_var), binary)
}

fn find_in_dirs(dirs: impl IntoIterator<Item = PathBuf>, binary: &str) -> Option<PathBuf> {
    dirs.into_iter()
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Exit status and diagnostic tail of a finished engine run.
#[derive(Debug)]
pub struct EngineRun {
    pub status: ExitStatus,
    pub tail: String,
}

/// Run the engine once, streaming its diagnostic output to `on_output`.
///
/// Returns `Ok(None)` when `cancel` fires; the process is killed and
/// reaped before returning. The child is also killed if this future is
/// dropped.
pub async fn run_engine<F>(
    backend: &dyn EncoderBackend,
    args: &[String],
    cancel: &CancellationToken,
    mut on_output: F,
) -> std::io::Result<Option<EngineRun>>
where
    F: FnMut(&str),
{
    if cancel.is_cancelled() {
        return Ok(None);
    }

    let mut cmd = backend.command(args);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let pid = child.id();
    tracing::debug!(
        pid,
        engine = backend.name(),
        args_len = args.len(),
        "Engine process started"
    );

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("engine stderr was not captured"))?;

    let mut tail = DiagnosticTail::default();
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                terminate(&mut child, pid).await;
                return Ok(None);
            }
            read = stderr.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    break;
                }
                let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                tail.push(&chunk);
                on_output(chunk.as_str());
            }
        }
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            terminate(&mut child, pid).await;
            return Ok(None);
        }
        status = child.wait() => status?,
    };

    if cancel.is_cancelled() {
        return Ok(None);
    }

    tracing::debug!(pid, %status, "Engine process exited");
    Ok(Some(EngineRun {
        status,
        tail: tail.into_string(),
    }))
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(pid, error = %e, "Failed to signal engine process");
    }
    match child.wait().await {
        Ok(status) => tracing::info!(pid, %status, "Engine process terminated"),
        Err(e) => tracing::warn!(pid, error = %e, "Failed to reap engine process"),
    }
}

//! Process execution with timeout, output capture and duplicate detection.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kubestrap_core::{Error, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, error};

use crate::process_table;
use crate::sink::{OutputSink, Stream, TracingSink};

/// How long buffered output is still read after a timeout kill.
pub const KILL_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// How child output is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Keep every line in [`ProcessStatus`]
    #[default]
    Buffered,
    /// Forward every line to the output sink as it arrives, keep nothing
    Streaming,
}

/// What the child reads on stdin.
#[derive(Debug, Clone, Default)]
pub enum StdinSource {
    /// The parent's stdin
    #[default]
    Inherit,
    /// Nothing; reads see end of file
    Null,
    /// Fixed bytes, then end of file
    Data(Vec<u8>),
}

/// Options for one execution.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Forced termination after this long; zero disables the limit
    pub timeout: Duration,
    /// Output collection mode
    pub capture: CaptureMode,
    /// Child stdin
    pub stdin: StdinSource,
    /// `PATH` handed to the child; inherited when unset
    pub search_path: Option<OsString>,
}

impl RunOptions {
    /// Buffered run with the given timeout.
    #[must_use]
    pub fn buffered(timeout: Duration) -> Self {
        Self {
            timeout,
            capture: CaptureMode::Buffered,
            ..Self::default()
        }
    }

    /// Streaming run with the given timeout.
    #[must_use]
    pub fn streaming(timeout: Duration) -> Self {
        Self {
            timeout,
            capture: CaptureMode::Streaming,
            ..Self::default()
        }
    }

    /// Replace the child stdin.
    #[must_use]
    pub fn with_stdin(mut self, stdin: StdinSource) -> Self {
        self.stdin = stdin;
        self
    }

    /// Hand `search_path` to the child as its `PATH`.
    #[must_use]
    pub fn with_search_path(mut self, search_path: OsString) -> Self {
        self.search_path = Some(search_path);
        self
    }
}

/// Result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    /// Child exit code; `-1` when the child produced none (signal, wait failure)
    pub exit_code: i32,
    /// Captured stdout lines (buffered mode only)
    pub stdout: Vec<String>,
    /// Captured stderr lines (buffered mode only)
    pub stderr: Vec<String>,
    /// False when the run was terminated by the timeout
    pub completed: bool,
    /// OS process id of the child
    pub pid: Option<u32>,
    /// Failure while waiting on the child, if any
    pub error: Option<String>,
    /// Wall time from spawn to exit
    pub runtime: Duration,
}

impl ProcessStatus {
    /// Ran to completion and exited with 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.completed && self.exit_code == 0 && self.error.is_none()
    }

    /// Stdout followed by stderr, one line each.
    #[must_use]
    pub fn combined_output(&self) -> String {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Launches processes.
#[derive(Clone)]
pub struct ProcessRunner {
    sink: Arc<dyn OutputSink>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner").finish_non_exhaustive()
    }
}

impl ProcessRunner {
    /// Create a runner forwarding streamed output to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }

    /// Run `executable` with `args` and wait for it.
    ///
    /// Empty arguments are dropped. Fails with [`Error::DuplicateInstance`]
    /// without spawning when the same command line is already running. A
    /// timeout is not an error: the child is killed and the status reports
    /// `completed == false`.
    pub async fn run(
        &self,
        executable: &Path,
        args: &[String],
        options: RunOptions,
    ) -> Result<ProcessStatus> {
        let args: Vec<String> = args.iter().filter(|a| !a.is_empty()).cloned().collect();

        let command_line = process_table::command_line(executable, &args);
        let needle = command_line.clone();
        let running = tokio::task::spawn_blocking(move || process_table::find_running(&needle))
            .await
            .unwrap_or_else(|e| {
                debug!(error = %e, "Process table scan did not complete");
                None
            });
        if let Some(pid) = running {
            return Err(Error::DuplicateInstance {
                command: command_line,
                pid,
            });
        }

        let tool = executable
            .file_name()
            .map_or_else(|| executable.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned();
        debug!(command = %command_line, timeout = ?options.timeout, mode = ?options.capture, "Running");

        let mut cmd = Command::new(executable);
        cmd.args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.stdin(match &options.stdin {
            StdinSource::Inherit => Stdio::inherit(),
            StdinSource::Null => Stdio::null(),
            StdinSource::Data(_) => Stdio::piped(),
        });
        if let Some(path) = &options.search_path {
            cmd.env("PATH", path);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| Error::spawn(executable, e))?;
        let pid = child.id();

        if let (StdinSource::Data(data), Some(mut stdin)) = (options.stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&data).await {
                    debug!(error = %e, "Child closed stdin early");
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::io_no_path(std::io::Error::other("stdout pipe not available"), "spawn"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::io_no_path(std::io::Error::other("stderr pipe not available"), "spawn"))?;

        let killed = Notify::new();
        let drain = drain(
            BufReader::new(stdout).lines(),
            BufReader::new(stderr).lines(),
            options.capture,
            &tool,
            self.sink.as_ref(),
            &killed,
        );

        let timeout = options.timeout;
        let wait = async {
            if timeout.is_zero() {
                return (child.wait().await, true);
            }
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => (status, true),
                Err(_) => {
                    error!(tool = %tool, ?timeout, "Timed out, terminating");
                    if let Err(e) = child.start_kill() {
                        error!(tool = %tool, error = %e, "Failed to terminate");
                    }
                    killed.notify_one();
                    (child.wait().await, false)
                }
            }
        };

        let ((stdout, stderr), (status, completed)) = tokio::join!(drain, wait);
        let (exit_code, error) = match status {
            Ok(status) => (status.code().unwrap_or(-1), None),
            Err(e) => (-1, Some(e.to_string())),
        };

        Ok(ProcessStatus {
            exit_code,
            stdout,
            stderr,
            completed,
            pid,
            error,
            runtime: started.elapsed(),
        })
    }
}

/// Read both pipes until both close.
///
/// Once the child is killed, whatever is still buffered is read for at most
/// [`KILL_DRAIN_GRACE`]; descendants holding the pipes open are abandoned.
async fn drain<O, E>(
    stdout: Lines<O>,
    stderr: Lines<E>,
    capture: CaptureMode,
    tool: &str,
    sink: &dyn OutputSink,
    killed: &Notify,
) -> (Vec<String>, Vec<String>)
where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    let mut out = Some(stdout);
    let mut err = Some(stderr);
    let mut out_lines = Vec::new();
    let mut err_lines = Vec::new();

    let mut keep = |stream: Stream, line: String| match capture {
        CaptureMode::Buffered => match stream {
            Stream::Stdout => out_lines.push(line),
            Stream::Stderr => err_lines.push(line),
        },
        CaptureMode::Streaming => sink.emit(tool, stream, &line),
    };

    tokio::select! {
        () = pump(&mut out, &mut err, &mut keep) => {}
        () = killed.notified() => {
            if tokio::time::timeout(KILL_DRAIN_GRACE, pump(&mut out, &mut err, &mut keep))
                .await
                .is_err()
            {
                debug!(%tool, "Output still open after termination, abandoning it");
            }
        }
    }
    (out_lines, err_lines)
}

/// Forward lines from both pipes until both close.
async fn pump<O, E>(
    out: &mut Option<Lines<O>>,
    err: &mut Option<Lines<E>>,
    keep: &mut impl FnMut(Stream, String),
) where
    O: AsyncBufRead + Unpin,
    E: AsyncBufRead + Unpin,
{
    while out.is_some() || err.is_some() {
        tokio::select! {
            line = next_line(out) => match line {
                Some(line) => keep(Stream::Stdout, line),
                None => *out = None,
            },
            line = next_line(err) => match line {
                Some(line) => keep(Stream::Stderr, line),
                None => *err = None,
            },
        }
    }
}

/// Next line of a pipe; pends forever once the pipe is gone.
async fn next_line<R: AsyncBufRead + Unpin>(lines: &mut Option<Lines<R>>) -> Option<String> {
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Stopped reading child output");
                None
            }
        },
        None => std::future::pending().await,
    }
}

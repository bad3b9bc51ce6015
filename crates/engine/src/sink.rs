//! Destinations for streamed child output.

use std::fmt;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Child stdout
    Stdout,
    /// Child stderr
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        })
    }
}

/// Receives child output lines as they arrive in streaming mode.
///
/// Lines of one stream are delivered in the order the child wrote them.
pub trait OutputSink: Send + Sync {
    /// Forward one line written by `tool`.
    fn emit(&self, tool: &str, stream: Stream, line: &str);
}

/// Emit a stdout line of a wrapped tool.
#[macro_export]
macro_rules! emit_tool_stdout {
    ($tool:expr, $content:expr) => {
        ::tracing::info!(
            target: "kubestrap::output",
            event_type = "output.stdout",
            tool = %$tool,
            "[{}] {}",
            $tool,
            $content,
        )
    };
}

/// Emit a stderr line of a wrapped tool.
#[macro_export]
macro_rules! emit_tool_stderr {
    ($tool:expr, $content:expr) => {
        ::tracing::warn!(
            target: "kubestrap::output",
            event_type = "output.stderr",
            tool = %$tool,
            "[{}] {}",
            $tool,
            $content,
        )
    };
}

/// Sink forwarding lines to `tracing`: stdout at INFO, stderr at WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn emit(&self, tool: &str, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => emit_tool_stdout!(tool, line),
            Stream::Stderr => emit_tool_stderr!(tool, line),
        }
    }
}

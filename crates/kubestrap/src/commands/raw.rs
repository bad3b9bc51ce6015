//! `kubestrap raw`: run a catalog tool.

use std::io::{self, Write};

use kubestrap_core::ToolCatalog;
use kubestrap_engine::{ProcessStatus, RunOptions};
use tracing::warn;

use super::App;
use crate::cli::{CliError, EXIT_FAILURE, EXIT_OK, RawArgs};

/// Run the tool named by `args`, or list the catalog when none is given.
///
/// Returns the exit code of the tool.
pub async fn execute(app: &App, args: &RawArgs) -> Result<i32, CliError> {
    if args.args.is_empty() {
        let catalog = app.engine.context().catalog();
        io::stdout()
            .lock()
            .write_all(utilities_listing(catalog).as_bytes())
            .map_err(|e| CliError::other(format!("failed to write to stdout: {e}")))?;
        return Ok(EXIT_OK);
    }

    let timeout = match args.timeout {
        Some(timeout) => timeout,
        None => app.config.raw_timeout()?,
    };
    let options = if args.raw_output {
        RunOptions::buffered(timeout)
    } else {
        RunOptions::streaming(timeout)
    };

    let status = app.engine.execute(&args.args, options).await?;
    if args.raw_output {
        write_lines(&mut io::stdout().lock(), &status.stdout)
            .and_then(|()| write_lines(&mut io::stderr().lock(), &status.stderr))
            .map_err(|e| CliError::other(format!("failed to write tool output: {e}")))?;
    }

    let tool = &args.args[0];
    if let Some(error) = &status.error {
        warn!(%tool, %error, "Tool did not exit cleanly");
    }
    if !status.completed {
        warn!(%tool, ?timeout, "Tool was terminated after the timeout");
    }
    Ok(exit_code(&status))
}

/// Mirror the child's status; anything without a positive code is a failure.
fn exit_code(status: &ProcessStatus) -> i32 {
    if status.success() {
        EXIT_OK
    } else if status.exit_code > 0 {
        status.exit_code
    } else {
        EXIT_FAILURE
    }
}

fn utilities_listing(catalog: &ToolCatalog) -> String {
    let mut out = String::from("Available utilities:\n");
    for tool in catalog.iter() {
        out.push_str(&format!("  - {} {}\n", tool.name, tool.release));
    }
    out
}

fn write_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubestrap_core::ToolDescriptor;
    use std::time::Duration;

    fn status(exit_code: i32, completed: bool) -> ProcessStatus {
        ProcessStatus {
            exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
            completed,
            pid: Some(1),
            error: None,
            runtime: Duration::ZERO,
        }
    }

    #[test]
    fn test_exit_code_mirrors_child() {
        assert_eq!(exit_code(&status(0, true)), EXIT_OK);
        assert_eq!(exit_code(&status(3, true)), 3);
        assert_eq!(exit_code(&status(-1, false)), EXIT_FAILURE);
        assert_eq!(exit_code(&status(0, false)), EXIT_FAILURE);
    }

    #[test]
    fn test_utilities_listing() {
        let catalog: ToolCatalog = [
            ToolDescriptor::new("kubectl", "v1.27.3"),
            ToolDescriptor::new("flux", "2.0.0"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            utilities_listing(&catalog),
            "Available utilities:\n  - kubectl v1.27.3\n  - flux 2.0.0\n"
        );
    }

    #[test]
    fn test_write_lines() {
        let mut out = Vec::new();
        write_lines(&mut out, &["one".into(), "two".into()]).unwrap();
        assert_eq!(out, b"one\ntwo\n");
    }
}

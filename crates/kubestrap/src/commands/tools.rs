//! `kubestrap tools` and `kubestrap version`.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use kubestrap_core::ToolCatalog;
use serde::Serialize;
use tracing::info;

use super::App;
use crate::cli::CliError;

/// Catalog entry as shown by `tools list --json`.
#[derive(Debug, Serialize)]
struct ToolSummary<'a> {
    name: &'a str,
    release: &'a str,
    aliases: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    help: Option<&'a str>,
}

fn emit(text: &str) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| CliError::other(format!("failed to write to stdout: {e}")))
}

/// Print the binary version.
pub fn print_version() -> Result<(), CliError> {
    emit(&format!("kubestrap {}\n", env!("CARGO_PKG_VERSION")))
}

/// Print the tool catalog.
pub fn list(app: &App, json: bool) -> Result<(), CliError> {
    let catalog = app.engine.context().catalog();
    let text = if json {
        let mut text = render_json(catalog)?;
        text.push('\n');
        text
    } else {
        render_table(catalog)
    };
    emit(&text)
}

/// Provision every named tool and print where it resolved to.
pub async fn ensure(
    app: &App,
    tools: &[String],
    timeout: Option<Duration>,
) -> Result<(), CliError> {
    let timeout = match timeout {
        Some(timeout) => timeout,
        None => app.config.raw_timeout()?,
    };
    for tool in tools {
        let path = app.engine.ensure(tool, timeout).await?;
        info!(%tool, path = %path.display(), "Tool ready");
        emit(&format!("{tool}: {}\n", path.display()))?;
    }
    Ok(())
}

/// Print an `export PATH=...` line for the cached tool directories.
pub fn path(app: &App) -> Result<(), CliError> {
    let context = app.engine.context();
    let dirs = context.layout().existing_tool_dirs(context.catalog());
    match path_export(&dirs) {
        Some(line) => emit(&line),
        None => {
            info!(cache_root = %context.layout().root().display(), "No cached tools yet");
            Ok(())
        }
    }
}

fn render_json(catalog: &ToolCatalog) -> Result<String, CliError> {
    let summaries: Vec<ToolSummary<'_>> = catalog
        .iter()
        .map(|tool| ToolSummary {
            name: &tool.name,
            release: &tool.release,
            aliases: &tool.aliases,
            help: (!tool.help.is_empty()).then_some(tool.help.as_str()),
        })
        .collect();
    serde_json::to_string_pretty(&summaries)
        .map_err(|e| CliError::other(format!("failed to serialize catalog: {e}")))
}

fn render_table(catalog: &ToolCatalog) -> String {
    if catalog.is_empty() {
        return "No tools configured. Add entries to 'raw.utilities' in kubestrap.yaml.\n".into();
    }

    let width = catalog.iter().map(|t| t.name.len()).max().unwrap_or(0);
    let mut out = String::from("Configured tools:\n\n");
    for tool in catalog.iter() {
        let mut line = format!("  {:width$}  {}", tool.name, tool.release);
        if !tool.aliases.is_empty() {
            line.push_str(&format!(" (also: {})", tool.aliases.join(", ")));
        }
        if !tool.help.is_empty() {
            line.push_str(&format!("  {}", tool.help));
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn path_export(dirs: &[PathBuf]) -> Option<String> {
    if dirs.is_empty() {
        return None;
    }
    let joined: Vec<String> = dirs.iter().map(|p| p.display().to_string()).collect();
    Some(format!("export PATH=\"{}:$PATH\"\n", joined.join(":")))
}

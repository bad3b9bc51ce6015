//! Best-effort detection of an identical command already running.
//!
//! The OS process table is scanned for a command line containing the exact
//! `<executable> <args>` text about to be launched. Two launches racing each
//! other can both pass the check.

use std::path::{Path, PathBuf};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

/// Command line used for matching: the cleaned executable path, then the
/// joined arguments when there are any.
#[must_use]
pub fn command_line(executable: &Path, args: &[String]) -> String {
    let cleaned: PathBuf = executable.components().collect();
    let mut line = cleaned.to_string_lossy().into_owned();
    if !args.is_empty() {
        line.push(' ');
        line.push_str(&args.join(" "));
    }
    line
}

/// PID of another process whose command line contains `needle`.
#[must_use]
pub fn find_running(needle: &str) -> Option<u32> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    let own = sysinfo::get_current_pid().ok();

    system
        .processes()
        .iter()
        .filter(|(pid, process)| Some(**pid) != own && process.thread_kind().is_none())
        .find(|(_, process)| {
            let cmd = process
                .cmd()
                .iter()
                .map(|part| part.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ");
            cmd.contains(needle)
        })
        .map(|(pid, _)| pid.as_u32())
}

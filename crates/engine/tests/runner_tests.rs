//! Process runner behaviour against real POSIX utilities.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kubestrap_core::Error;
use kubestrap_engine::process_table;
use kubestrap_engine::{OutputSink, ProcessRunner, RunOptions, StdinSource, Stream};

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl RecordingSink {
    fn lines(&self, stream: Stream) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn emit(&self, _tool: &str, stream: Stream, line: &str) {
        self.lines.lock().unwrap().push((stream, line.to_string()));
    }
}

fn utility(name: &str) -> PathBuf {
    which::which(name).unwrap()
}

const FIVE_LINES: &str = "echo one; echo uno >&2; echo two; echo dos >&2; echo three";

#[tokio::test]
async fn test_buffered_capture_splits_streams() {
    let runner = ProcessRunner::default();
    let status = runner
        .run(
            &utility("sh"),
            &["-c".into(), FIVE_LINES.into()],
            RunOptions::buffered(Duration::from_secs(10)).with_stdin(StdinSource::Null),
        )
        .await
        .unwrap();

    assert!(status.success());
    assert!(status.pid.is_some());
    assert_eq!(status.stdout, vec!["one", "two", "three"]);
    assert_eq!(status.stderr, vec!["uno", "dos"]);
}

#[tokio::test]
async fn test_streaming_forwards_lines_in_order() {
    let sink = Arc::new(RecordingSink::default());
    let runner = ProcessRunner::new(sink.clone());
    let status = runner
        .run(
            &utility("sh"),
            &["-c".into(), FIVE_LINES.into()],
            RunOptions::streaming(Duration::from_secs(10)).with_stdin(StdinSource::Null),
        )
        .await
        .unwrap();

    assert!(status.success());
    assert!(status.stdout.is_empty());
    assert!(status.stderr.is_empty());
    assert_eq!(sink.lines(Stream::Stdout), vec!["one", "two", "three"]);
    assert_eq!(sink.lines(Stream::Stderr), vec!["uno", "dos"]);
}

#[tokio::test]
async fn test_timeout_terminates_child() {
    let runner = ProcessRunner::default();
    let started = Instant::now();
    let status = runner
        .run(
            &utility("sleep"),
            &["10".into()],
            RunOptions::buffered(Duration::from_secs(1)).with_stdin(StdinSource::Null),
        )
        .await
        .unwrap();

    assert!(!status.completed);
    assert!(!status.success());
    assert_ne!(status.exit_code, 0);
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_output_written_around_the_kill_is_kept() {
    let runner = ProcessRunner::default();
    let started = Instant::now();
    let status = runner
        .run(
            &utility("sh"),
            &["-c".into(), "echo early; (sleep 1.3; echo late; sleep 3) & sleep 10".into()],
            RunOptions::buffered(Duration::from_secs(1)).with_stdin(StdinSource::Null),
        )
        .await
        .unwrap();

    assert!(!status.completed);
    assert_eq!(status.stdout, vec!["early", "late"]);
    // The background shell still holds the pipe; draining gives up after the grace period.
    assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    let runner = ProcessRunner::default();
    let status = runner
        .run(
            &utility("sh"),
            &["-c".into(), "echo failing >&2; exit 3".into()],
            RunOptions::buffered(Duration::ZERO).with_stdin(StdinSource::Null),
        )
        .await
        .unwrap();

    assert!(status.completed);
    assert_eq!(status.exit_code, 3);
    assert_eq!(status.stderr, vec!["failing"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_instance_is_refused() {
    let sleep = utility("sleep");
    let args = vec!["3.217".to_string()];
    let needle = process_table::command_line(&sleep, &args);

    let runner = ProcessRunner::default();
    let first = {
        let (runner, sleep, args) = (runner.clone(), sleep.clone(), args.clone());
        tokio::spawn(async move {
            runner
                .run(&sleep, &args, RunOptions::buffered(Duration::from_secs(10)).with_stdin(StdinSource::Null))
                .await
        })
    };

    let deadline = Instant::now() + Duration::from_secs(3);
    while process_table::find_running(&needle).is_none() {
        assert!(Instant::now() < deadline, "first instance never appeared");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let second = runner
        .run(&sleep, &args, RunOptions::buffered(Duration::from_secs(10)).with_stdin(StdinSource::Null))
        .await;
    match second {
        Err(Error::DuplicateInstance { pid, command }) => {
            assert!(pid > 0);
            assert!(command.ends_with("sleep 3.217"));
        }
        other => panic!("expected duplicate instance error, got {other:?}"),
    }

    let first = first.await.unwrap().unwrap();
    assert!(first.success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_duplicate_instance_without_arguments_is_refused() {
    let temp = tempfile::TempDir::new().unwrap();
    let script = temp.path().join("reconcile-loop");
    std::fs::write(&script, "#!/bin/sh\nsleep 3\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let needle = process_table::command_line(&script, &[]);
    assert!(!needle.ends_with(' '));

    let runner = ProcessRunner::default();
    let first = {
        let (runner, script) = (runner.clone(), script.clone());
        tokio::spawn(async move {
            runner
                .run(&script, &[], RunOptions::buffered(Duration::from_secs(10)).with_stdin(StdinSource::Null))
                .await
        })
    };

    let deadline = Instant::now() + Duration::from_secs(3);
    while process_table::find_running(&needle).is_none() {
        assert!(Instant::now() < deadline, "first instance never appeared");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let second = runner
        .run(&script, &[], RunOptions::buffered(Duration::from_secs(10)).with_stdin(StdinSource::Null))
        .await;
    assert!(
        matches!(second, Err(Error::DuplicateInstance { ref command, .. }) if *command == needle),
        "expected duplicate instance error, got {second:?}"
    );

    let first = first.await.unwrap().unwrap();
    assert!(first.success());
}

#[tokio::test]
async fn test_search_path_is_passed_to_child() {
    let runner = ProcessRunner::default();
    let status = runner
        .run(
            &utility("sh"),
            &["-c".into(), "echo $PATH".into()],
            RunOptions::buffered(Duration::from_secs(10))
                .with_stdin(StdinSource::Null)
                .with_search_path("/opt/kubestrap/bin:/usr/bin:/bin".into()),
        )
        .await
        .unwrap();

    assert_eq!(status.stdout, vec!["/opt/kubestrap/bin:/usr/bin:/bin"]);
}

//! Resolution and provisioning against a temporary cache.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use kubestrap_core::{
    CacheLayout, Error, Platform, ProvisioningContext, Result, SourceTable, ToolDescriptor,
};
use kubestrap_engine::{Downloader, Engine, Fetcher, RunOptions, StdinSource, TracingSink};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(10);

/// Serves a fixed payload and counts requests.
#[derive(Default)]
struct FakeDownloader {
    calls: AtomicUsize,
    payload: Vec<u8>,
}

impl FakeDownloader {
    fn serving(payload: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            payload,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let target = if dest.is_dir() {
            dest.join(url.rsplit('/').next().unwrap_or("download"))
        } else {
            dest.to_path_buf()
        };
        std::fs::write(&target, &self.payload).map_err(|e| Error::io(e, &target, "write"))?;
        Ok(target)
    }
}

fn everywhere(locator: &str) -> SourceTable {
    SourceTable {
        linux: locator.into(),
        darwin: locator.into(),
        windows: locator.into(),
    }
}

fn descriptor(name: &str, release: &str, locator: &str) -> ToolDescriptor {
    let mut descriptor = ToolDescriptor::new(name, release);
    descriptor.sources = everywhere(locator);
    descriptor
}

fn context(root: &Path, tools: Vec<ToolDescriptor>, search_path: Vec<PathBuf>) -> Arc<ProvisioningContext> {
    Arc::new(ProvisioningContext::with_search_path(
        CacheLayout::new(root.join("cache")),
        Platform::detect().unwrap(),
        tools.into_iter().collect(),
        search_path,
    ))
}

fn engine(context: Arc<ProvisioningContext>, downloader: Arc<FakeDownloader>) -> Engine {
    Engine::new(context, downloader, Arc::new(TracingSink))
}

fn script(path: &Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_path(path).unwrap();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn test_cache_hit_skips_download() {
    let temp = TempDir::new().unwrap();
    let mut age = descriptor("age", "v1.1.1", "https://example.invalid/age.tar.gz");
    age.aliases = vec!["age-keygen".into()];
    let ctx = context(temp.path(), vec![age.clone()], Vec::new());

    let tool_dir = ctx.layout().dir_for(&age);
    script(&tool_dir.join("age"), "echo v1.1.1");
    script(&tool_dir.join("age-keygen"), "echo v1.1.1");

    let downloader = FakeDownloader::serving(Vec::new());
    let fetcher = Fetcher::new(ctx, downloader.clone());
    let files = fetcher.ensure_executable(&age).await.unwrap();

    assert_eq!(files, vec![tool_dir.join("age"), tool_dir.join("age-keygen")]);
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_installed_tool_resolves_idempotently() {
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    script(&bin.join("flux"), "echo \"flux version 2.0.0\"");

    let flux = descriptor("flux", "2.0.0", "https://example.invalid/flux.tar.gz");
    let downloader = FakeDownloader::serving(Vec::new());
    let engine = engine(context(temp.path(), vec![flux], vec![bin.clone()]), downloader.clone());

    let first = engine.ensure("flux", TIMEOUT).await.unwrap();
    let second = engine.ensure("flux", TIMEOUT).await.unwrap();
    assert_eq!(first, bin.join("flux"));
    assert_eq!(first, second);
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_release_mismatch_provisions_from_local_file() {
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    script(&bin.join("flux"), "echo \"flux version 1.9.0\"");
    let provided = temp.path().join("provided").join("flux");
    script(&provided, "echo \"flux version 2.0.0\"");

    let flux = descriptor("flux", "2.0.0", &format!("file://{}", provided.display()));
    let downloader = FakeDownloader::serving(Vec::new());
    let ctx = context(temp.path(), vec![flux.clone()], vec![bin]);
    let engine = engine(Arc::clone(&ctx), downloader.clone());

    let resolved = engine.ensure("flux", TIMEOUT).await.unwrap();
    assert_eq!(resolved, ctx.layout().dir_for(&flux).join("flux"));
    assert!(provided.exists(), "operator-provided file must be copied, not moved");
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_downloaded_archive_is_unpacked_and_removed() {
    let temp = TempDir::new().unwrap();
    let mut mytool = descriptor("mytool", "v0.3.0", "https://example.invalid/{{name}}-{{release}}.tar.gz");
    mytool.extract.list = vec!["dist/mytool".into()];
    let ctx = context(temp.path(), vec![mytool.clone()], Vec::new());
    let downloader = FakeDownloader::serving(tarball(&[
        ("dist/mytool", "#!/bin/sh\necho mytool v0.3.0\n"),
        ("dist/README", "docs"),
    ]));
    let engine = engine(Arc::clone(&ctx), downloader.clone());

    let resolved = engine.ensure("mytool", TIMEOUT).await.unwrap();
    let tool_dir = ctx.layout().dir_for(&mytool);
    assert_eq!(resolved, tool_dir.join("mytool"));
    assert!(!tool_dir.join("mytool-v0.3.0.tar.gz").exists());
    assert!(!tool_dir.join("README").exists());
    assert_eq!(downloader.calls(), 1);

    let status = engine
        .execute(
            &["mytool".to_string()],
            RunOptions::buffered(TIMEOUT).with_stdin(StdinSource::Null),
        )
        .await
        .unwrap();
    assert_eq!(status.stdout, vec!["mytool v0.3.0"]);
    assert_eq!(downloader.calls(), 1);
}

#[tokio::test]
async fn test_invocation_template_supplies_arguments() {
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    script(&bin.join("kubectl"), "echo \"$@\"");

    let mut kubectl = descriptor("kubectl", "", "https://example.invalid/kubectl");
    kubectl.invocation = vec!["kubectl".into(), "get".into(), "nodes".into()];
    let engine = engine(
        context(temp.path(), vec![kubectl], vec![bin]),
        FakeDownloader::serving(Vec::new()),
    );

    let out = engine.capture_stdout(&["kubectl".into()], TIMEOUT).await.unwrap();
    assert_eq!(out, "get nodes");
    let out = engine
        .capture_stdout(&["kubectl".into(), "version".into()], TIMEOUT)
        .await
        .unwrap();
    assert_eq!(out, "version");
}

#[tokio::test]
async fn test_alias_runs_its_own_executable() {
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    script(&bin.join("age"), "echo age v1.1.1");
    script(&bin.join("age-keygen"), "echo keygen");

    let mut age = descriptor("age", "v1.1.1", "https://example.invalid/age.tar.gz");
    age.aliases = vec!["age-keygen".into()];
    let engine = engine(
        context(temp.path(), vec![age], vec![bin]),
        FakeDownloader::serving(Vec::new()),
    );

    let out = engine.capture_stdout(&["age-keygen".into()], TIMEOUT).await.unwrap();
    assert_eq!(out, "keygen");
}

#[tokio::test]
async fn test_failed_command_carries_exit_code() {
    let temp = TempDir::new().unwrap();
    let bin = temp.path().join("bin");
    script(&bin.join("sops"), "if [ \"$1\" = version ]; then echo sops 3.7.3; exit 0; fi\necho boom >&2\nexit 4");

    let engine = engine(
        context(temp.path(), vec![descriptor("sops", "3.7.3", "https://example.invalid/sops")], vec![bin]),
        FakeDownloader::serving(Vec::new()),
    );

    let err = engine
        .capture_stdout(&["sops".into(), "--decrypt".into()], TIMEOUT)
        .await
        .unwrap_err();
    match err {
        Error::CommandFailed { exit_code, output, .. } => {
            assert_eq!(exit_code, 4);
            assert_eq!(output, "boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_source_is_configuration_error() {
    let temp = TempDir::new().unwrap();
    let tool = ToolDescriptor::new("k0sctl", "v0.15.0");
    let engine = engine(
        context(temp.path(), vec![tool], Vec::new()),
        FakeDownloader::serving(Vec::new()),
    );

    let err = engine.ensure("k0sctl", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unsupported_scheme() {
    let temp = TempDir::new().unwrap();
    let tool = descriptor("k0sctl", "v0.15.0", "ftp://example.invalid/k0sctl");
    let downloader = FakeDownloader::serving(Vec::new());
    let engine = engine(context(temp.path(), vec![tool], Vec::new()), downloader.clone());

    let err = engine.ensure("k0sctl", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedScheme { scheme, .. } if scheme == "ftp"));
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_executable_missing_after_provisioning() {
    let temp = TempDir::new().unwrap();
    let mut tool = descriptor("mytool", "v1", "https://example.invalid/mytool.tar.gz");
    tool.extract.pattern = "^other$".into();
    let engine = engine(
        context(temp.path(), vec![tool], Vec::new()),
        FakeDownloader::serving(tarball(&[("other", "x")])),
    );

    let err = engine.ensure("mytool", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, Error::NotFoundAfterProvisioning { .. }));
}

#[tokio::test]
async fn test_unknown_tool() {
    let temp = TempDir::new().unwrap();
    let engine = engine(context(temp.path(), Vec::new(), Vec::new()), FakeDownloader::serving(Vec::new()));
    let err = engine
        .execute(&["helm".into()], RunOptions::buffered(TIMEOUT))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolNotFound { name } if name == "helm"));
}

#[tokio::test]
async fn test_declared_cache_path_archive_is_unpacked_and_kept() {
    let temp = TempDir::new().unwrap();
    let mut mytool = descriptor("mytool", "v1", "https://example.invalid/mytool.tar.gz");
    mytool.cache_path = "mytool.tar.gz".into();
    let ctx = context(temp.path(), vec![mytool.clone()], Vec::new());

    let tool_dir = ctx.layout().dir_for(&mytool);
    std::fs::create_dir_all(&tool_dir).unwrap();
    let archive = tool_dir.join("mytool.tar.gz");
    std::fs::write(&archive, tarball(&[("mytool", "#!/bin/sh\necho v1\n")])).unwrap();

    let downloader = FakeDownloader::serving(Vec::new());
    let files = Fetcher::new(ctx, downloader.clone())
        .ensure_executable(&mytool)
        .await
        .unwrap();

    assert_eq!(files, vec![tool_dir.join("mytool")]);
    assert!(archive.exists(), "operator-provided archive must be kept");
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_cached_artifact_in_tool_dir_is_unpacked_without_download() {
    let temp = TempDir::new().unwrap();
    let mytool = descriptor("mytool", "v1", "https://example.invalid/mytool-v1.tar.gz");
    let ctx = context(temp.path(), vec![mytool.clone()], Vec::new());

    let tool_dir = ctx.layout().dir_for(&mytool);
    std::fs::create_dir_all(&tool_dir).unwrap();
    std::fs::write(
        tool_dir.join("mytool-v1.tar.gz"),
        tarball(&[("release/mytool", "#!/bin/sh\necho v1\n")]),
    )
    .unwrap();

    let mut with_list = mytool.clone();
    with_list.extract.list = vec!["release/mytool".into()];
    let downloader = FakeDownloader::serving(Vec::new());
    let files = Fetcher::new(ctx, downloader.clone())
        .ensure_executable(&with_list)
        .await
        .unwrap();

    assert_eq!(files, vec![tool_dir.join("mytool")]);
    assert!(tool_dir.join("mytool").is_file());
    assert_eq!(downloader.calls(), 0);
}

#[tokio::test]
async fn test_download_into_declared_cache_path_is_removed_after_unpacking() {
    let temp = TempDir::new().unwrap();
    let mut mytool = descriptor("mytool", "v1", "https://example.invalid/mytool.tar.gz");
    mytool.cache_path = "mytool.tar.gz".into();
    let ctx = context(temp.path(), vec![mytool.clone()], Vec::new());
    let tool_dir = ctx.layout().dir_for(&mytool);

    let downloader = FakeDownloader::serving(tarball(&[("mytool", "#!/bin/sh\necho v1\n")]));
    let files = Fetcher::new(ctx, downloader.clone())
        .ensure_executable(&mytool)
        .await
        .unwrap();

    assert_eq!(files, vec![tool_dir.join("mytool")]);
    assert!(!tool_dir.join("mytool.tar.gz").exists(), "downloaded archive must be removed");
    assert_eq!(downloader.calls(), 1);
}

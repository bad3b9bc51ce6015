//! Artifact downloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kubestrap_core::{Error, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Interval between progress log lines.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Fetches remote artifacts onto the local filesystem.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` to `dest` and return the file written.
    ///
    /// When `dest` is an existing directory the file is named after the
    /// last URL path segment.
    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf>;
}

/// [`Downloader`] over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a downloader with its own connection pool.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("kubestrap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::download("", format!("HTTP client initialisation failed: {e}")))?;
        Ok(Self { client })
    }

    /// Create a downloader sharing an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        let target = target_path(url, dest)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, parent, "create"))?;
        }
        info!(%url, target = %target.display(), "Downloading");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::download(url, e.to_string()))?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(Error::download(url, format!("HTTP {status}")));
        }

        let total = response.content_length();
        let mut body = response.bytes_stream();
        let partial = partial_path(&target);
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| Error::io(e, &partial, "create"))?;

        let mut received: u64 = 0;
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                chunk = body.next() => match chunk {
                    Some(Ok(bytes)) => {
                        file.write_all(&bytes)
                            .await
                            .map_err(|e| Error::io(e, &partial, "write"))?;
                        received += bytes.len() as u64;
                    }
                    Some(Err(e)) => return Err(Error::download(url, e.to_string())),
                    None => break,
                },
                _ = ticker.tick() => report_progress(url, received, total),
            }
        }
        file.flush().await.map_err(|e| Error::io(e, &partial, "write"))?;
        drop(file);
        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| Error::io(e, &target, "rename"))?;

        debug!(%url, bytes = received, "Download complete");
        Ok(target)
    }
}

fn report_progress(url: &str, received: u64, total: Option<u64>) {
    match total.filter(|t| *t > 0) {
        Some(total) => {
            #[allow(clippy::cast_precision_loss)]
            let percent = received as f64 * 100.0 / total as f64;
            info!(%url, received, total, percent = %format!("{percent:.1}"), "Download progress");
        }
        None => info!(%url, received, "Download progress"),
    }
}

/// Sibling file the body is streamed into before it is complete.
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

/// File the download of `url` lands in.
fn target_path(url: &str, dest: &Path) -> Result<PathBuf> {
    if !dest.is_dir() {
        return Ok(dest.to_path_buf());
    }
    let name = kubestrap_core::SourceLocator::Http(url.to_string())
        .file_name()
        .ok_or_else(|| Error::download(url, "cannot derive a file name from the URL"))?;
    Ok(dest.join(name))
}

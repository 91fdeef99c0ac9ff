//! Source file access for frame previews.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::EnrichmentError;

/// Reads the text of the file a frame points at.
#[async_trait]
pub trait SourceFetcher: Send + Sync + std::fmt::Debug {
    /// Returns the full text of `location`, a path or URL taken from a frame.
    async fn fetch(&self, location: &str) -> Result<String, EnrichmentError>;
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Reads sources from the local filesystem.
///
/// Accepts plain paths and `file://` URLs. Relative paths are resolved
/// against `root` when one is set, otherwise against the working directory.
#[derive(Debug, Clone, Default)]
pub struct FsSourceFetcher {
    root: Option<PathBuf>,
}

impl FsSourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative frame paths against `root`.
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    fn resolve_path(&self, location: &str) -> PathBuf {
        let raw = Path::new(location.strip_prefix("file://").unwrap_or(location));
        match &self.root {
            Some(root) if raw.is_relative() => root.join(raw),
            _ => raw.to_path_buf(),
        }
    }
}

#[async_trait]
impl SourceFetcher for FsSourceFetcher {
    async fn fetch(&self, location: &str) -> Result<String, EnrichmentError> {
        if is_remote(location) {
            return Err(EnrichmentError::UnsupportedLocation(location.to_string()));
        }

        let path = self.resolve_path(location);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| EnrichmentError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

/// Downloads sources over HTTP(S), e.g. bundles served by a web app.
#[derive(Debug, Clone, Default)]
pub struct HttpSourceFetcher {
    client: reqwest::Client,
}

impl HttpSourceFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, location: &str) -> Result<String, EnrichmentError> {
        if !is_remote(location) {
            return Err(EnrichmentError::UnsupportedLocation(location.to_string()));
        }

        let http_err = |source: reqwest::Error| EnrichmentError::Http {
            url: location.to_string(),
            source,
        };

        let response = self.client.get(location).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::Status {
                url: location.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await.map_err(http_err)?;
        debug!(url = location, bytes = text.len(), "Fetched remote source");
        Ok(text)
    }
}

/// Routes `http(s)://` locations to HTTP and everything else to the filesystem.
#[derive(Debug, Clone, Default)]
pub struct DefaultSourceFetcher {
    fs: FsSourceFetcher,
    http: HttpSourceFetcher,
}

impl DefaultSourceFetcher {
    /// Combines a filesystem and an HTTP fetcher.
    pub fn new(fs: FsSourceFetcher, http: HttpSourceFetcher) -> Self {
        Self { fs, http }
    }
}

#[async_trait]
impl SourceFetcher for DefaultSourceFetcher {
    async fn fetch(&self, location: &str) -> Result<String, EnrichmentError> {
        if is_remote(location) {
            self.http.fetch(location).await
        } else {
            self.fs.fetch(location).await
        }
    }
}

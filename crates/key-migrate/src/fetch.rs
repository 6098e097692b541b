//! Media download with one retry and compensation on permanent failure.
//!
//! [`RetryingFetcher::fetch`] streams the asset to disk and derives its
//! thumbnail. A network failure is retried exactly once with the same
//! request. If the retry fails too, the Media row is destroyed, any partial
//! file is removed and the fetch resolves as [`FetchOutcome::Skipped`].
//! Filesystem, store and thumbnail errors are not retried and propagate.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use key_migrate_core::store::{EntityRef, EntityStore};

use crate::thumbnail::{derive_thumbnail_async, thumbnail_path, ImageKind, ThumbnailSpec};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where media bytes come from.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Write the bytes at `url` to `dest`, replacing any existing file.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// [`MediaSource`] over HTTP(S), streaming the body to disk.
pub struct HttpMediaSource {
    http: reqwest::Client,
}

impl HttpMediaSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let network = |e: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        };
        let io = |source: std::io::Error| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(network)?;

        let mut file = tokio::fs::File::create(dest).await.map_err(io)?;
        while let Some(chunk) = response.chunk().await.map_err(network)? {
            file.write_all(&chunk).await.map_err(io)?;
        }
        file.flush().await.map_err(io)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched,
    /// Both attempts failed; the Media row and any partial file are gone.
    Skipped { reason: String },
}

pub struct RetryingFetcher<'a> {
    source: &'a dyn MediaSource,
    store: &'a dyn EntityStore,
    thumbnails: ThumbnailSpec,
}

impl<'a> RetryingFetcher<'a> {
    pub fn new(
        source: &'a dyn MediaSource,
        store: &'a dyn EntityStore,
        thumbnails: ThumbnailSpec,
    ) -> Self {
        Self {
            source,
            store,
            thumbnails,
        }
    }

    /// Fetch `url` into `destination/file_name` for Media row `media_id`.
    pub async fn fetch(
        &self,
        media_id: i64,
        url: &str,
        file_name: &str,
        destination: &Path,
    ) -> Result<FetchOutcome> {
        tokio::fs::create_dir_all(destination)
            .await
            .with_context(|| format!("Failed to create {}", destination.display()))?;
        let file = destination.join(file_name);

        let first = match self.source.download(url, &file).await {
            Ok(()) => None,
            Err(FetchError::Network { reason, .. }) => Some(reason),
            Err(e) => return Err(e.into()),
        };
        if let Some(reason) = first {
            debug!(stage = "media", url, error = %reason, "retrying media fetch");
            match self.source.download(url, &file).await {
                Ok(()) => {}
                Err(FetchError::Network { reason, .. }) => {
                    return self.compensate(media_id, url, &file, reason).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let media = self
            .store
            .find_media(media_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("media {} disappeared before thumbnailing", media_id))?;
        let kind = ImageKind::from_mime(&media.mime_type)
            .ok_or_else(|| anyhow::anyhow!("unsupported media type '{}'", media.mime_type))?;

        let thumb = thumbnail_path(&file, kind);
        derive_thumbnail_async(file, thumb, kind, self.thumbnails).await?;
        Ok(FetchOutcome::Fetched)
    }

    async fn compensate(
        &self,
        media_id: i64,
        url: &str,
        file: &Path,
        reason: String,
    ) -> Result<FetchOutcome> {
        warn!(stage = "media", url, media_id, error = %reason, "could not get media, skipping");
        self.store.destroy(&EntityRef::Media(media_id)).await?;
        match tokio::fs::remove_file(file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", file.display()))
            }
        }
        Ok(FetchOutcome::Skipped { reason })
    }
}

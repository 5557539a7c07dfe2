//! Artwork cache
//!
//! Cover art is downloaded once per track and kept on disk as
//! `{cache_dir}/{key}.jpg`. The key is the track id when the peer reports
//! one, otherwise an md5 digest of the artwork URL.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of local artwork files
#[async_trait]
pub trait ArtworkStore: Send + Sync {
    /// Local path of the artwork for a track, downloading it if needed.
    /// `Ok(None)` when there is nothing to fetch.
    async fn fetch(&self, track_id: &str, url: &str) -> Result<Option<PathBuf>>;
}

/// Result of an artwork lookup through the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artwork {
    Cached(PathBuf),
    Unavailable,
}

impl Artwork {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Cached(path) => Some(path),
            Self::Unavailable => None,
        }
    }
}

/// Disk-backed [`ArtworkStore`]
pub struct ArtworkCache {
    dir: PathBuf,
    http: Client,
}

impl ArtworkCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("ytm-control/", env!("YTMC_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            dir: dir.into(),
            http,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the artwork for this track lives (or would live)
    pub fn path_for(&self, track_id: &str, url: &str) -> PathBuf {
        self.dir.join(format!("{}.jpg", cache_key(track_id, url)))
    }

    async fn download(&self, url: &str, target: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        tracing::debug!("Downloading artwork from {}", url);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("artwork request failed: {}", response.status()));
        }
        let bytes = response.bytes().await?;

        // Temp file, then rename into place
        let temp = target.with_extension("jpg.tmp");
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, target).await?;

        tracing::info!("Cached artwork {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }
}

#[async_trait]
impl ArtworkStore for ArtworkCache {
    async fn fetch(&self, track_id: &str, url: &str) -> Result<Option<PathBuf>> {
        if track_id.is_empty() && url.is_empty() {
            return Ok(None);
        }

        let path = self.path_for(track_id, url);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Some(path));
        }
        if url.is_empty() {
            return Ok(None);
        }

        self.download(url, &path).await?;
        Ok(Some(path))
    }
}

/// File stem for a cached image
pub fn cache_key(track_id: &str, url: &str) -> String {
    if track_id.is_empty() {
        format!("{:x}", md5::compute(url.as_bytes()))
    } else {
        track_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

//! Media acquisition
//!
//! Turns a submission's media source into a local file the recognizer can read:
//! - uploads are already on disk and are used as-is
//! - video-sharing URLs go through an external extraction tool (yt-dlp by default)
//! - any other URL is downloaded over HTTP
//!
//! The result is a [`TempMedia`] guard; dropping it deletes the file.

use reqwest::Url;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use super::scratch::TempMedia;

const USER_AGENT: &str = concat!("SongScan/", env!("CARGO_PKG_VERSION"));

/// Acquisition errors; each one ends the job in `state: "error"`
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to fetch URL: {0}")]
    Network(String),

    #[error("Failed to fetch URL: {status}")]
    HttpStatus { status: reqwest::StatusCode },

    #[error("{program} could not be started: {source}")]
    ExtractorUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed (code {code}): {stderr}")]
    ExtractorFailed {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("{program} produced no output file at {path}")]
    ExtractorNoOutput { program: String, path: PathBuf },

    #[error("Failed to store media: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a job's media comes from
#[derive(Debug)]
pub enum MediaSource {
    /// File already written by the HTTP layer
    Upload(TempMedia),
    /// Remote URL, as submitted
    Url(String),
}

/// Acquirer settings
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    pub extractor_program: String,
    /// Hostname substrings (lowercase) that mark a video-sharing link
    pub video_hosts: Vec<String>,
    pub download_dir: PathBuf,
    pub download_timeout: Duration,
}

/// Media acquirer
pub struct MediaAcquirer {
    config: AcquirerConfig,
    http_client: reqwest::Client,
}

impl MediaAcquirer {
    pub fn new(config: AcquirerConfig) -> Result<Self, AcquisitionError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.download_timeout)
            .build()
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Produce a local media file for the source
    pub async fn acquire(&self, source: MediaSource) -> Result<TempMedia, AcquisitionError> {
        match source {
            MediaSource::Upload(media) => {
                debug!(path = %media.path().display(), "Using uploaded media");
                Ok(media)
            }
            MediaSource::Url(raw) => {
                let url = parse_media_url(&raw)?;
                if self.is_video_url(&url) {
                    self.extract_audio(&url).await
                } else {
                    self.download(&url).await
                }
            }
        }
    }

    /// True when the URL's hostname contains one of the configured video hosts
    pub fn is_video_url(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };
        self.config
            .video_hosts
            .iter()
            .any(|pattern| host.contains(&pattern.to_lowercase()))
    }

    async fn download(&self, url: &Url) -> Result<TempMedia, AcquisitionError> {
        let target = self.config.download_dir.join(format!(
            "media_{}{}",
            Uuid::new_v4().simple(),
            infer_extension(url)
        ));

        info!(url = %url, target = %target.display(), "Downloading media");

        let mut response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AcquisitionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::HttpStatus { status });
        }

        // Guard first so a failed write never leaves a partial file behind
        let media = TempMedia::new(target)?;
        let mut file = tokio::fs::File::create(media.path()).await?;
        let mut bytes_written: u64 = 0;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AcquisitionError::Network(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(url = %url, bytes = bytes_written, "Media downloaded");
        Ok(media)
    }

    async fn extract_audio(&self, url: &Url) -> Result<TempMedia, AcquisitionError> {
        let program = &self.config.extractor_program;
        let media = TempMedia::new(
            self.config
                .download_dir
                .join(format!("yt_{}.m4a", Uuid::new_v4().simple())),
        )?;

        info!(url = %url, extractor = %program, "Extracting audio");

        let output = Command::new(program)
            .arg("-f")
            .arg("bestaudio")
            .arg("-o")
            .arg(media.path())
            .arg(url.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AcquisitionError::ExtractorUnavailable {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(AcquisitionError::ExtractorFailed {
                program: program.clone(),
                code: output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: if stderr.is_empty() {
                    "unknown error".to_string()
                } else {
                    stderr
                },
            });
        }

        if !media.path().exists() {
            return Err(AcquisitionError::ExtractorNoOutput {
                program: program.clone(),
                path: media.path().to_path_buf(),
            });
        }

        info!(url = %url, path = %media.path().display(), "Audio extracted");
        Ok(media)
    }
}

fn parse_media_url(raw: &str) -> Result<Url, AcquisitionError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| AcquisitionError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AcquisitionError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// File extension hint for the recognizer, from the URL path
///
/// Case-insensitive; the query string is ignored. Unknown types get `.bin`.
pub fn infer_extension(url: &Url) -> &'static str {
    let path = url.path().to_lowercase();
    [".mp3", ".m4a", ".wav", ".mp4"]
        .into_iter()
        .find(|ext| path.ends_with(ext))
        .unwrap_or(".bin")
}

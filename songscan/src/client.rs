//! Polling client for the scan API
//!
//! Submits a scan and polls `GET /scan/:id` at a fixed interval until the
//! job reaches a terminal state. Used by `songscan scan`.

use reqwest::{multipart, StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::api::scan::SubmitResponse;
use crate::error::ValidationError;
use crate::models::{JobStatus, RecognizedSegment, ScanParameters};

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Client-side errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Scan failed: {0}")]
    JobFailed(String),

    #[error("Cannot read media file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Scan API client
pub struct ScanClient {
    base: String,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl ScanClient {
    /// Validate the API base before anything is sent
    pub fn new(api_base: &str) -> Result<Self, ClientError> {
        let trimmed = api_base.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::ApiBase("empty".to_string()).into());
        }
        let url = Url::parse(trimmed)
            .map_err(|e| ValidationError::ApiBase(format!("{}: {}", trimmed, e)))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ValidationError::ApiBase(format!("{} is not an http(s) URL", trimmed)).into());
        }

        Ok(Self {
            base: trimmed.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Upload a local media file; returns the job id
    pub async fn submit_file(&self, path: &Path, params: &ScanParameters) -> Result<String, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        let form = with_params(multipart::Form::new(), params)
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));
        self.submit(form).await
    }

    /// Submit a remote URL; returns the job id
    pub async fn submit_url(&self, url: &str, params: &ScanParameters) -> Result<String, ClientError> {
        let form = with_params(multipart::Form::new(), params).text("url", url.to_string());
        self.submit(form).await
    }

    async fn submit(&self, form: multipart::Form) -> Result<String, ClientError> {
        let response = self
            .http
            .post(format!("{}/scan", self.base))
            .multipart(form)
            .send()
            .await?;
        let body: SubmitResponse = check_status(response).await?.json().await?;
        debug!(job_id = %body.job_id, "Scan submitted");
        Ok(body.job_id)
    }

    /// Current snapshot of a job
    pub async fn status(&self, job_id: &str) -> Result<JobStatus, ClientError> {
        let response = self
            .http
            .get(format!("{}/scan/{}", self.base, job_id))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Poll until the job is done or failed
    ///
    /// `on_update` sees every snapshot, including the terminal one.
    pub async fn wait_for_completion<F>(
        &self,
        job_id: &str,
        mut on_update: F,
    ) -> Result<Vec<RecognizedSegment>, ClientError>
    where
        F: FnMut(&JobStatus),
    {
        loop {
            let status = self.status(job_id).await?;
            on_update(&status);
            match status {
                JobStatus::Done { merged, .. } => return Ok(merged),
                JobStatus::Error { error } => return Err(ClientError::JobFailed(error)),
                JobStatus::Processing { .. } => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

fn with_params(form: multipart::Form, params: &ScanParameters) -> multipart::Form {
    params
        .to_form_fields()
        .into_iter()
        .fold(form, |form, (name, value)| form.text(name, value))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error.message)
        .unwrap_or(text);
    Err(ClientError::Status { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_base_must_be_configured() {
        assert!(matches!(
            ScanClient::new("   "),
            Err(ClientError::Validation(ValidationError::ApiBase(_)))
        ));
        assert!(matches!(
            ScanClient::new("not a url"),
            Err(ClientError::Validation(ValidationError::ApiBase(_)))
        ));
        assert!(matches!(
            ScanClient::new("ftp://example.com"),
            Err(ClientError::Validation(ValidationError::ApiBase(_)))
        ));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = ScanClient::new("http://localhost:3000/").unwrap();
        assert_eq!(client.base(), "http://localhost:3000");
    }
}

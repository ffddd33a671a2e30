//! VideoJobClient - submits a video job, polls it to completion and downloads
//! the result.
//!
//! Job lifecycle: Submitted -> Polling -> Completed -> Downloading -> Ready,
//! or Failed from any stage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::client::{extract_error_message, ClientError, GenAiClient, Operation};
use super::types::GenerationRequest;
use crate::config::{GenerationConfig, DEFAULT_POLL_INTERVAL_SECS};
use crate::handle::{HandleTracker, VideoHandle};

/// Default interval between job status checks (10 seconds).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS);

/// MIME type assumed when the download carries no content type.
const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Upper bound on the buffer reserved up front from `Content-Length`.
const MAX_PREALLOC_BYTES: usize = 16 * 1024 * 1024;

/// Initial download buffer size; the advertised length is not trusted past the cap.
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length
        .map(|len| usize::try_from(len).unwrap_or(usize::MAX))
        .unwrap_or(0)
        .min(MAX_PREALLOC_BYTES)
}

const HTTP_STATUS_BAD_REQUEST: u16 = 400;
const HTTP_STATUS_FORBIDDEN: u16 = 403;

/// Failures while creating or waiting on a video job.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Video generation failed (code {code}): {message}")]
    Operation { code: i32, message: String },

    #[error("Video generation completed, but no download link was found.")]
    MissingResult,

    #[error("Video generation did not finish within {} seconds.", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("Video generation was cancelled.")]
    Cancelled,
}

/// Failures while retrieving the finished video.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("{}", status_message(*status, detail.as_deref()))]
    Status { status: u16, detail: Option<String> },

    #[error("Failed to download video, likely due to a network issue or API key restrictions (like HTTP referrers). Please verify your API key configuration.")]
    Network(#[source] reqwest::Error),
}

/// User-facing message for a failed download.
fn status_message(status: u16, detail: Option<&str>) -> String {
    let mut message = format!(
        "Failed to download video. Server responded with status {}.",
        status
    );
    match detail {
        Some(detail) => {
            message.push_str(" Detail: ");
            message.push_str(detail);
        }
        None if status == HTTP_STATUS_BAD_REQUEST => message.push_str(
            " This may be due to an invalid request or API key restrictions (like HTTP referrers). Please check your key configuration and the request parameters.",
        ),
        None if status == HTTP_STATUS_FORBIDDEN => message.push_str(
            " This indicates an issue with API key permissions. Please verify your key's restrictions in the Google Cloud console.",
        ),
        None => {}
    }
    message
}

/// Any failure of `submit_and_await`.
#[derive(Debug, thiserror::Error)]
pub enum VideoJobError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Something that can turn a request into a downloaded video.
pub trait VideoGenerator: Send + Sync {
    fn submit_and_await(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<VideoHandle, VideoJobError>> + Send;
}

/// Polling behaviour of a `VideoJobClient`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    /// `None` waits as long as the job takes.
    pub max_wait: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
        }
    }
}

impl From<&GenerationConfig> for PollOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_wait: config.max_wait(),
        }
    }
}

/// Client driving a video job from submission to downloaded bytes.
pub struct VideoJobClient {
    client: GenAiClient,
    options: PollOptions,
    tracker: Arc<HandleTracker>,
}

impl VideoJobClient {
    pub fn new(client: GenAiClient) -> Self {
        Self::with_options(client, PollOptions::default())
    }

    pub fn with_options(client: GenAiClient, options: PollOptions) -> Self {
        Self {
            client,
            options,
            tracker: HandleTracker::new(),
        }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    /// Tracker counting the handles this client has issued.
    pub fn tracker(&self) -> &Arc<HandleTracker> {
        &self.tracker
    }

    /// Poll a submitted job until it reports done.
    ///
    /// Sleeps `interval` between checks. Stops early when `cancel` fires or
    /// when `max_wait` is configured and exceeded.
    pub async fn await_completion(
        &self,
        mut operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<Operation, GenerationError> {
        let name = operation.name.clone();
        let started = Instant::now();
        let mut polls = 0u32;

        while !operation.done {
            if let Some(max_wait) = self.options.max_wait {
                if started.elapsed() >= max_wait {
                    log::error!("Job {} still running after {:?}, giving up", name, max_wait);
                    return Err(GenerationError::Timeout { waited: max_wait });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Job {} cancelled while polling", name);
                    return Err(GenerationError::Cancelled);
                }
                _ = tokio::time::sleep(self.options.interval) => {}
            }

            polls += 1;
            log::debug!("Polling job {} (check {})", name, polls);
            operation = self.client.get_operation(&name).await?;
        }

        log::info!("Job {} completed after {} checks", name, polls);
        Ok(operation)
    }

    /// Download the asset at `uri` into memory and register it as a handle.
    pub async fn download(&self, uri: &str) -> Result<VideoHandle, VideoJobError> {
        let url = self.client.asset_url(uri).map_err(GenerationError::from)?;
        log::info!("Downloading video from: {}", uri);

        let response = self
            .client
            .fetch_asset(url)
            .await
            .map_err(DownloadError::Network)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            log::error!("Video download failed with status {}. Body: {}", status, body);

            let detail = extract_error_message(&body).or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            });
            return Err(DownloadError::Status { status, detail }.into());
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("video/"))
            .unwrap_or(DEFAULT_VIDEO_MIME)
            .to_string();

        let mut bytes = Vec::with_capacity(initial_capacity(response.content_length()));
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(DownloadError::Network)?;
            bytes.extend_from_slice(&chunk);
        }

        log::info!("Downloaded {} bytes ({})", bytes.len(), mime_type);
        Ok(self.tracker.register(bytes, mime_type))
    }
}

impl VideoGenerator for VideoJobClient {
    async fn submit_and_await(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<VideoHandle, VideoJobError> {
        log::info!("Submitting video job for prompt: {}", request.prompt);
        let operation = self
            .client
            .submit_video(request)
            .await
            .map_err(GenerationError::from)?;
        log::info!("Job submitted: {}", operation.name);

        let operation = self.await_completion(operation, &cancel).await?;

        if let Some(error) = operation.error {
            log::error!("Job finished with error {}: {}", error.code, error.message);
            return Err(GenerationError::Operation {
                code: error.code,
                message: error.message,
            }
            .into());
        }

        let uri = operation.video_uri().ok_or(GenerationError::MissingResult)?;
        self.download(uri).await
    }
}

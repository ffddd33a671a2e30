//! GenAiClient - handles communication with the generative language API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::types::{AspectRatio, GenerationRequest};
use crate::config::{ApiConfig, DEFAULT_BASE_URL, DEFAULT_TEXT_MODEL, DEFAULT_VIDEO_MODEL};

/// Header carrying the API credential.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// API version path segment.
const API_VERSION: &str = "v1beta";

/// Timeout for API calls (submission, polling, text generation).
const API_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection timeout (30 seconds).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of videos requested per job.
const SAMPLE_COUNT: u32 = 1;

// === Video generation wire types ===

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<VideoInstance<'a>>,
    parameters: VideoParameters,
}

#[derive(Debug, Serialize)]
struct VideoInstance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ReferenceImage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceImage<'a> {
    bytes_base64_encoded: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    sample_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<AspectRatio>,
}

/// A long-running video job as reported by the API.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Operation {
    /// Job handle used for polling.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResponse>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl Operation {
    /// URI of the first generated video, if the job produced one.
    pub fn video_uri(&self) -> Option<&str> {
        self.response
            .as_ref()?
            .generate_video_response
            .as_ref()?
            .generated_samples
            .first()?
            .video
            .as_ref()?
            .uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OperationResponse {
    #[serde(rename = "generateVideoResponse", default)]
    pub generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GenerateVideoResponse {
    #[serde(rename = "generatedSamples", default)]
    pub generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GeneratedSample {
    #[serde(default)]
    pub video: Option<VideoRef>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct VideoRef {
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

// === Text generation wire types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateContentRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
    pub generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
pub(crate) struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationSettings {
    pub response_mime_type: &'static str,
    pub response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Structured error body returned by the API: `{"error": {"message": ...}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Extract `error.message` from a structured error body.
pub fn extract_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .filter(|m| !m.trim().is_empty())
}

/// Client for the generative language API.
///
/// Constructed explicitly with a credential and passed to whoever needs it.
#[derive(Debug, Clone)]
pub struct GenAiClient {
    api_key: String,
    base_url: String,
    text_model: String,
    video_model: String,
    http_client: reqwest::Client,
}

impl GenAiClient {
    /// Create a new client with an explicit API key and default endpoints.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::MissingApiKey` if the key is empty.
    pub fn with_api_key(api_key: String) -> Result<Self, ClientError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Create a new client with a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ClientError> {
        Self::from_config(
            api_key,
            &ApiConfig {
                base_url,
                text_model: DEFAULT_TEXT_MODEL.to_string(),
                video_model: DEFAULT_VIDEO_MODEL.to_string(),
            },
        )
    }

    /// Create a new client from the `[api]` config section.
    pub fn from_config(api_key: String, api: &ApiConfig) -> Result<Self, ClientError> {
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            text_model: api.text_model.clone(),
            video_model: api.video_model.clone(),
            http_client,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn text_model(&self) -> &str {
        &self.text_model
    }

    pub fn video_model(&self) -> &str {
        &self.video_model
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/{}/models/{}:{}", self.base_url, API_VERSION, model, method)
    }

    fn operation_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, name.trim_start_matches('/'))
    }

    /// Turn a non-success response into `ClientError::Api`.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = extract_error_message(&body).unwrap_or(body);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Run the text model once and return the parsed response.
    pub(crate) async fn generate_content(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ClientError> {
        let url = self.model_url(&self.text_model, "generateContent");

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(API_TIMEOUT)
            .json(request)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Submit a video generation job.
    ///
    /// Returns the initial `Operation` whose `name` is the job handle.
    pub async fn submit_video(&self, request: &GenerationRequest) -> Result<Operation, ClientError> {
        let url = self.model_url(&self.video_model, "predictLongRunning");

        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: &request.prompt,
                image: request.image.as_ref().map(|image| ReferenceImage {
                    bytes_base64_encoded: &image.bytes_base64,
                    mime_type: &image.mime_type,
                }),
            }],
            parameters: VideoParameters {
                sample_count: SAMPLE_COUNT,
                aspect_ratio: request.aspect_ratio,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(API_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Fetch the current state of a video job.
    pub async fn get_operation(&self, name: &str) -> Result<Operation, ClientError> {
        let response = self
            .http_client
            .get(self.operation_url(name))
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(API_TIMEOUT)
            .send()
            .await?;

        let response = Self::check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Build the download URL for a result URI, with the credential appended.
    pub fn asset_url(&self, uri: &str) -> Result<reqwest::Url, ClientError> {
        let mut url = reqwest::Url::parse(uri).map_err(|e| ClientError::InvalidUrl {
            url: uri.to_string(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Start downloading a finished asset. Status is left to the caller.
    pub async fn fetch_asset(&self, url: reqwest::Url) -> Result<reqwest::Response, reqwest::Error> {
        self.http_client.get(url).send().await
    }
}

/// Errors from raw API communication.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

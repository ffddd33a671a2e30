//! Generative API integration.
//!
//! Prompt suggestions come from the text model; videos come from the video
//! model as long-running jobs that are polled until done and then downloaded
//! into a `VideoHandle`.

mod client;
mod suggest;
mod types;
mod video_job;

pub use client::{
    extract_error_message, ClientError, GenAiClient, GenerateVideoResponse, GeneratedSample,
    Operation, OperationError, OperationResponse, VideoRef,
};
pub use suggest::{PromptSuggester, SuggestionError, SUGGESTION_SYSTEM_INSTRUCTION};
pub use types::{AspectRatio, GenerationRequest};
pub use video_job::{
    DownloadError, GenerationError, PollOptions, VideoGenerator, VideoJobClient, VideoJobError,
    DEFAULT_POLL_INTERVAL,
};

//! Request types shared by the suggestion and video clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::media::ImageInput;

/// Requested output frame proportions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 16:9
    #[serde(rename = "16:9")]
    Widescreen,
    /// 9:16
    #[serde(rename = "9:16")]
    Vertical,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Vertical => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Widescreen),
            "9:16" => Ok(AspectRatio::Vertical),
            other => Err(format!(
                "Unknown aspect ratio '{}'. Use 16:9 or 9:16",
                other
            )),
        }
    }
}

/// A video generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: Option<ImageInput>,
    pub aspect_ratio: Option<AspectRatio>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
            aspect_ratio: None,
        }
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(aspect_ratio);
        self
    }
}

//! Media encoding for reference images.
//!
//! Reference images travel to the API as base64 text together with their
//! MIME type.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;

/// An image ready to be sent inline with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInput {
    /// Base64-encoded image bytes (standard alphabet, padded).
    pub bytes_base64: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

/// Errors that can occur while encoding an image.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Failed to read image '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unsupported image type '{}' (expected png, jpeg, webp, gif or heic)", path.display())]
    UnsupportedType { path: PathBuf },
}

/// Infer an image MIME type from the file extension.
pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

/// Encode raw image bytes.
pub fn encode_bytes(bytes: &[u8], mime_type: &str) -> ImageInput {
    ImageInput {
        bytes_base64: STANDARD.encode(bytes),
        mime_type: mime_type.to_string(),
    }
}

/// Read an image file and encode it for transmission.
pub async fn encode_file(path: &Path) -> Result<ImageInput, MediaError> {
    let mime_type = mime_type_for(path).ok_or_else(|| MediaError::UnsupportedType {
        path: path.to_path_buf(),
    })?;

    let bytes = tokio::fs::read(path).await.map_err(|e| MediaError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    log::debug!("Encoded {} ({} bytes, {})", path.display(), bytes.len(), mime_type);
    Ok(encode_bytes(&bytes, mime_type))
}

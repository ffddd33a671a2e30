//! VideoHandle - disposable handle over downloaded video bytes.
//!
//! A handle is the locally addressable reference to a finished video. It is
//! released exactly once: either explicitly through [`VideoHandle::dispose`]
//! or, as a fallback, when it is dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// Counts handles issued and released.
///
/// Shared between the job client that issues handles and whoever wants to
/// check that nothing is leaking.
#[derive(Debug, Default)]
pub struct HandleTracker {
    next_id: AtomicU64,
    live: AtomicUsize,
    released: AtomicUsize,
}

impl HandleTracker {
    /// Create a new tracker wrapped in an `Arc` for sharing.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register downloaded bytes and return a handle for them.
    pub fn register(self: &Arc<Self>, bytes: Vec<u8>, mime_type: impl Into<String>) -> VideoHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let digest = content_digest(&bytes);
        let locator = format!("video:{}-{}", digest, id);
        self.live.fetch_add(1, Ordering::SeqCst);
        log::debug!("Registered {} ({} bytes)", locator, bytes.len());

        VideoHandle {
            locator,
            mime_type: mime_type.into(),
            bytes,
            tracker: Arc::clone(self),
            released: false,
        }
    }

    /// Number of handles issued and not yet released.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of handles released so far.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// First 8 bytes of the SHA256 of the content, hex-encoded.
fn content_digest(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    hex::encode(&hash[..8])
}

/// Opaque handle over the bytes of a downloaded video.
#[derive(Debug)]
pub struct VideoHandle {
    locator: String,
    mime_type: String,
    bytes: Vec<u8>,
    tracker: Arc<HandleTracker>,
    released: bool,
}

impl VideoHandle {
    /// Locator string identifying this handle, e.g. `video:1f2e...-3`.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// MIME type reported by the server (or `video/mp4`).
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The video bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the video in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the video to `dest`, creating parent directories as needed.
    pub fn save(&self, dest: &Path) -> Result<PathBuf, std::io::Error> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(dest, &self.bytes)?;
        log::info!("Saved {} to {}", self.locator, dest.display());
        Ok(dest.to_path_buf())
    }

    /// Release the handle and its bytes.
    ///
    /// Consumes the handle, so it cannot be disposed twice.
    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.bytes = Vec::new();
        self.tracker.live.fetch_sub(1, Ordering::SeqCst);
        self.tracker.released.fetch_add(1, Ordering::SeqCst);
        log::debug!("Released {}", self.locator);
    }
}

impl Drop for VideoHandle {
    fn drop(&mut self) {
        if !self.released {
            log::warn!("{} dropped without dispose; releasing", self.locator);
            self.release();
        }
    }
}

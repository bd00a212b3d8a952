//! Error types for image rendering.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while rendering embedded images.
///
/// Per-image errors never leave the pipeline: they are logged and the
/// image is skipped.
#[derive(Debug, Error)]
pub enum Error {
    /// The image file is empty, corrupt or in an unsupported format.
    #[error("Cannot decode image {content_id}: {reason}")]
    ImageDecodeFailed {
        /// Content-ID of the image.
        content_id: String,
        /// Decoder message.
        reason: String,
    },

    /// The image file could not be read.
    #[error("Cannot read image file {}: {source}", path.display())]
    ImageRead {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The renderer has shut down.
    #[error("Renderer is closed")]
    Closed,
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn decode(content_id: &str, reason: impl ToString) -> Self {
        Self::ImageDecodeFailed {
            content_id: content_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

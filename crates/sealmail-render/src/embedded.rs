//! Embedded image descriptors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An image stored on disk and referenced from the message body by
/// Content-ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedImage {
    /// Content-ID without angle brackets.
    pub content_id: String,
    /// Local file, usually inside the message's attachment directory.
    pub path: PathBuf,
    /// Transfer encoding of the stored file (`base64`, `binary`, ...).
    pub encoding: String,
    /// MIME type of the image.
    pub content_type: String,
    /// Owning message.
    pub message_id: String,
}

impl EmbeddedImage {
    /// Creates a descriptor, normalizing the Content-ID.
    #[must_use]
    pub fn new(
        content_id: &str,
        path: impl Into<PathBuf>,
        encoding: impl Into<String>,
        content_type: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self {
            content_id: normalize(content_id),
            path: path.into(),
            encoding: encoding.into(),
            content_type: content_type.into(),
            message_id: message_id.into(),
        }
    }

    /// Returns the Content-ID with surrounding whitespace and angle brackets
    /// removed.
    #[must_use]
    pub fn normalized_content_id(&self) -> String {
        normalize(&self.content_id)
    }

    /// True if the stored file holds base64 text rather than raw bytes.
    #[must_use]
    pub fn is_base64(&self) -> bool {
        self.encoding.trim().eq_ignore_ascii_case("base64")
    }
}

fn normalize(content_id: &str) -> String {
    content_id
        .trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
        .to_string()
}

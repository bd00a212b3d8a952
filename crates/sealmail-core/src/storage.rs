//! On-disk storage of decrypted attachments.

use std::path::{Path, PathBuf};

use tracing::debug;

use sealmail_crypto::Attachment;
use sealmail_render::EmbeddedImage;

use crate::error::Result;
use crate::message::DecryptedMessage;

/// Encoding of files written by [`store_attachments`].
const STORED_ENCODING: &str = "binary";

/// An attachment written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// Attachment record.
    pub attachment: Attachment,
    /// File holding the decoded content.
    pub path: PathBuf,
}

/// Replaces every character outside `[A-Za-z0-9._-]` with `_`.
///
/// Leading dots are replaced too, so the result never names a parent or
/// hidden entry.
#[must_use]
pub fn sanitize_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let dots = sanitized.len() - sanitized.trim_start_matches('.').len();
    let sanitized = format!("{}{}", "_".repeat(dots), &sanitized[dots..]);
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}

/// Writes the decoded attachments of `message` into `dir`.
///
/// Files are named `<position>-<file name>` so equal names do not collide.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub async fn store_attachments(
    dir: &Path,
    message: &DecryptedMessage,
) -> Result<Vec<StoredAttachment>> {
    if message.attachments.is_empty() {
        return Ok(Vec::new());
    }
    tokio::fs::create_dir_all(dir).await?;

    let mut stored = Vec::with_capacity(message.attachments.len());
    for (position, part) in message.attachments.iter().enumerate() {
        let name = format!(
            "{position}-{}",
            sanitize_component(&part.attachment.file_name)
        );
        let path = dir.join(name);
        tokio::fs::write(&path, &part.content).await?;
        stored.push(StoredAttachment {
            attachment: part.attachment.clone(),
            path,
        });
    }
    debug!(message_id = %message.id, count = stored.len(), "Stored attachments");
    Ok(stored)
}

/// Builds renderer descriptors for the stored attachments the body
/// references by Content-ID.
#[must_use]
pub fn embedded_images(message: &DecryptedMessage, stored: &[StoredAttachment]) -> Vec<EmbeddedImage> {
    stored
        .iter()
        .filter_map(|file| {
            let cid = file.attachment.content_id.as_deref()?;
            message
                .embedded_image_ids
                .iter()
                .any(|id| id == cid)
                .then(|| {
                    EmbeddedImage::new(
                        cid,
                        &file.path,
                        STORED_ENCODING,
                        file.attachment.mime_type.as_str(),
                        message.id.as_str(),
                    )
                })
        })
        .collect()
}

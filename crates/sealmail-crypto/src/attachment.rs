//! Attachment records derived from decrypted MIME parts.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use sealmail_mime::Part;
use serde::{Deserialize, Serialize};

/// Prefix of every attachment id assigned during PGP/MIME decryption.
pub const PGP_ATTACHMENT_PREFIX: &str = "PGPAttachment";

/// MIME types that are rendered inline when referenced by `cid:` from the body.
pub const INLINE_RASTER_TYPES: &[&str] = &[
    "image/gif",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/bmp",
];

#[allow(clippy::unwrap_used)]
static CID_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)cid:([^"'\s>)]+)"#).unwrap());

/// Attachment metadata handed to the attachment list and to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Stable identifier.
    pub id: String,
    /// Display file name.
    pub file_name: String,
    /// MIME type essence, lowercase.
    pub mime_type: String,
    /// Decoded size in bytes.
    pub size: u64,
    /// Whether the attachment is rendered inside the body.
    pub inline: bool,
    /// Content-ID without angle brackets.
    pub content_id: Option<String>,
    /// Owning message.
    pub message_id: String,
}

impl Attachment {
    /// Returns true if the id was assigned by PGP/MIME extraction.
    #[must_use]
    pub fn is_pgp_mime(&self) -> bool {
        self.id
            .strip_prefix(PGP_ATTACHMENT_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Builds the record for one decoded MIME leaf.
    pub(crate) fn from_part(
        part: &Part,
        content: &[u8],
        message_id: &str,
        index: usize,
        embedded_image_ids: &[String],
    ) -> Self {
        let mime_type = part
            .content_type()
            .map_or_else(|_| "application/octet-stream".to_string(), |ct| ct.essence());
        let content_id = part.content_id().map(normalize_content_id);
        let file_name = part.file_name().unwrap_or_else(|| {
            content_id
                .clone()
                .unwrap_or_else(|| format!("attachment-{index}"))
        });

        let disposition_inline = part.disposition().is_some_and(|d| d.is_inline());
        let inline = disposition_inline
            || is_embedded_raster(&mime_type, content_id.as_deref(), embedded_image_ids);

        Self {
            id: pgp_attachment_id(message_id, content, index),
            file_name,
            mime_type,
            size: content.len() as u64,
            inline,
            content_id,
            message_id: message_id.to_string(),
        }
    }
}

/// Derives the deterministic id of a PGP/MIME attachment.
///
/// ```
/// use sealmail_crypto::pgp_attachment_id;
///
/// let id = pgp_attachment_id("msg-1", b"hello", 0);
/// assert_eq!(id, "PGPAttachment/msg-1/5d41402abc4b2a76b9719d911017c592/0");
/// ```
#[must_use]
pub fn pgp_attachment_id(message_id: &str, content: &[u8], index: usize) -> String {
    format!(
        "{PGP_ATTACHMENT_PREFIX}/{message_id}/{:x}/{index}",
        md5::compute(content)
    )
}

/// Strips surrounding whitespace and angle brackets from a Content-ID.
#[must_use]
pub fn normalize_content_id(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
        .to_string()
}

/// Collects the content-ids referenced as `cid:` URIs in a body, in order
/// of first appearance.
#[must_use]
pub fn extract_embedded_image_ids(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CID_REFERENCE
        .captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| normalize_content_id(m.as_str()))
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}

fn is_embedded_raster(mime_type: &str, content_id: Option<&str>, embedded: &[String]) -> bool {
    let Some(content_id) = content_id else {
        return false;
    };
    INLINE_RASTER_TYPES.contains(&mime_type) && embedded.iter().any(|id| id == content_id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_id_format() {
        let id = pgp_attachment_id("m", b"", 3);
        assert_eq!(id, "PGPAttachment/m/d41d8cd98f00b204e9800998ecf8427e/3");
    }

    #[test]
    fn test_attachment_id_depends_on_index() {
        assert_ne!(
            pgp_attachment_id("m", b"same", 0),
            pgp_attachment_id("m", b"same", 1)
        );
    }

    #[test]
    fn test_normalize_content_id() {
        assert_eq!(normalize_content_id("<logo@example>"), "logo@example");
        assert_eq!(normalize_content_id("  plain "), "plain");
        assert_eq!(normalize_content_id("<>"), "");
    }

    #[test]
    fn test_extract_embedded_ids() {
        let html = r#"<img src="cid:logo@x"><img src='CID:photo'><img src="cid:logo@x"> cid:tail)"#;
        assert_eq!(
            extract_embedded_image_ids(html),
            vec!["logo@x".to_string(), "photo".to_string(), "tail".to_string()]
        );
        assert!(extract_embedded_image_ids("no references").is_empty());
    }

    #[test]
    fn test_inline_by_disposition() {
        let part = Part::parse(
            b"Content-Type: application/pdf\r\nContent-Disposition: inline; filename=a.pdf\r\n\r\nx",
        )
        .unwrap();
        let att = Attachment::from_part(&part, b"x", "m", 0, &[]);
        assert!(att.inline);
        assert_eq!(att.file_name, "a.pdf");
        assert_eq!(att.mime_type, "application/pdf");
    }

    #[test]
    fn test_inline_by_embedded_reference() {
        let part = Part::parse(
            b"Content-Type: image/png\r\nContent-ID: <logo>\r\nContent-Disposition: attachment\r\n\r\nx",
        )
        .unwrap();
        let referenced = Attachment::from_part(&part, b"x", "m", 1, &["logo".to_string()]);
        assert!(referenced.inline);
        assert_eq!(referenced.file_name, "logo");

        let unreferenced = Attachment::from_part(&part, b"x", "m", 1, &[]);
        assert!(!unreferenced.inline);
    }

    #[test]
    fn test_non_raster_reference_not_inline() {
        let part = Part::parse(b"Content-Type: image/svg+xml\r\nContent-ID: <v>\r\n\r\nx").unwrap();
        let att = Attachment::from_part(&part, b"x", "m", 2, &["v".to_string()]);
        assert!(!att.inline);
    }

    #[test]
    fn test_default_file_name() {
        let part = Part::parse(b"Content-Type: application/octet-stream\r\n\r\nx").unwrap();
        let att = Attachment::from_part(&part, b"x", "m", 4, &[]);
        assert_eq!(att.file_name, "attachment-4");
        assert!(att.is_pgp_mime());
    }
}

//! Body and attachment extraction from decrypted PGP/MIME payloads.

use sealmail_mime::{Headers, Message, Part};
use tracing::{debug, warn};

use crate::attachment::{Attachment, extract_embedded_image_ids};
use crate::decrypt::SignatureStatus;
use crate::error::Result;

/// The displayable body of a PGP/MIME message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeBody {
    /// Decoded body text.
    pub text: String,
    /// `text/html` or `text/plain`.
    pub mime_type: String,
}

/// An attachment part with its decoded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeAttachment {
    /// Derived attachment record.
    pub attachment: Attachment,
    /// Headers of the MIME part.
    pub headers: Headers,
    /// Transfer-decoded content.
    pub content: Vec<u8>,
}

/// An attachment part whose content could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFailure {
    /// Sequence index the part would have had.
    pub index: usize,
    /// File name, if the headers carry one.
    pub file_name: Option<String>,
    /// Decoder error.
    pub reason: String,
}

/// Everything produced by one PGP/MIME decryption.
///
/// There is exactly one body; attachments keep MIME part order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeDecryption {
    /// Message body.
    pub body: MimeBody,
    /// Decoded attachments.
    pub attachments: Vec<MimeAttachment>,
    /// Attachment parts that failed to decode.
    pub failed_attachments: Vec<AttachmentFailure>,
    /// Signature outcome over the whole payload.
    pub signature: SignatureStatus,
    /// Content-ids referenced from the body as `cid:` URIs.
    pub embedded_image_ids: Vec<String>,
}

impl MimeDecryption {
    /// Returns the attachment records.
    pub fn attachment_records(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().map(|a| &a.attachment)
    }
}

pub(crate) fn extract(
    plaintext: &[u8],
    message_id: &str,
    signature: SignatureStatus,
) -> Result<MimeDecryption> {
    let message = Message::parse(plaintext)?;

    let body_part = message.html_part().or_else(|| message.text_part());
    let body = match body_part {
        Some(part) => MimeBody {
            text: part.body_text_lossy()?,
            mime_type: part
                .content_type()
                .map_or_else(|_| "text/plain".to_string(), |ct| ct.essence()),
        },
        None => MimeBody {
            text: String::new(),
            mime_type: "text/plain".to_string(),
        },
    };
    let embedded_image_ids = extract_embedded_image_ids(&body.text);

    let mut attachments = Vec::new();
    let mut failed_attachments = Vec::new();

    let renditions = body_part.map_or_else(Vec::new, |body| body_renditions(&message, body));
    let attachment_parts = message
        .leaves()
        .filter(|part| !renditions.iter().any(|r| std::ptr::eq(*r, *part)))
        .filter(|part| !is_protected_headers(part));

    for (index, part) in attachment_parts.enumerate() {
        match part.decode_body() {
            Ok(content) => {
                let attachment =
                    Attachment::from_part(part, &content, message_id, index, &embedded_image_ids);
                debug!(
                    id = %attachment.id,
                    mime_type = %attachment.mime_type,
                    size = attachment.size,
                    "Extracted attachment"
                );
                attachments.push(MimeAttachment {
                    attachment,
                    headers: part.headers.clone(),
                    content,
                });
            }
            Err(e) => {
                warn!(index, error = %e, "Cannot decode attachment part");
                failed_attachments.push(AttachmentFailure {
                    index,
                    file_name: part.file_name(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(MimeDecryption {
        body,
        attachments,
        failed_attachments,
        signature,
        embedded_image_ids,
    })
}

/// The body and the other text leaves of its nearest `multipart/alternative`
/// ancestor.
///
/// Text leaves outside that container are attachments even without a file
/// name.
fn body_renditions<'a>(message: &'a Message, body: &'a Part) -> Vec<&'a Part> {
    let alternative = message.root().ancestry(body).and_then(|chain| {
        chain.into_iter().rev().find(|part| {
            part.content_type()
                .is_ok_and(|ct| ct.is("multipart", "alternative"))
        })
    });

    match alternative {
        Some(container) => container
            .leaves()
            .filter(|leaf| std::ptr::eq(*leaf, body) || is_inline_text(leaf))
            .collect(),
        None => vec![body],
    }
}

fn is_inline_text(part: &Part) -> bool {
    !part.is_attachment_like()
        && part
            .content_type()
            .is_ok_and(|ct| ct.is("text", "plain") || ct.is("text", "html"))
}

fn is_protected_headers(part: &Part) -> bool {
    part.content_type()
        .is_ok_and(|ct| ct.is("text", "rfc822-headers"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALTERNATIVE: &str = "Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
        \r\n\
        --outer\r\n\
        Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
        \r\n\
        --alt\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Plain body\r\n\
        --alt\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        \r\n\
        <p>HTML body <img src=\"cid:logo@sealmail\"></p>\r\n\
        --alt--\r\n\
        --outer\r\n\
        Content-Type: image/png\r\n\
        Content-ID: <logo@sealmail>\r\n\
        Content-Transfer-Encoding: base64\r\n\
        \r\n\
        iVBORw0KGgo=\r\n\
        --outer\r\n\
        Content-Type: text/plain\r\n\
        Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
        \r\n\
        notes\r\n\
        --outer--\r\n";

    #[test]
    fn test_html_body_preferred() {
        let result = extract(ALTERNATIVE.as_bytes(), "m1", SignatureStatus::Unsigned).unwrap();
        assert_eq!(result.body.mime_type, "text/html");
        assert!(result.body.text.starts_with("<p>HTML body"));
        assert_eq!(result.embedded_image_ids, vec!["logo@sealmail".to_string()]);
    }

    #[test]
    fn test_attachments_in_part_order() {
        let result = extract(ALTERNATIVE.as_bytes(), "m1", SignatureStatus::Unsigned).unwrap();
        assert_eq!(result.attachments.len(), 2);

        let logo = &result.attachments[0].attachment;
        assert_eq!(logo.mime_type, "image/png");
        assert!(logo.inline);
        assert!(logo.id.ends_with("/0"));
        assert_eq!(result.attachments[0].content, b"\x89PNG\r\n\x1a\n");

        let notes = &result.attachments[1].attachment;
        assert_eq!(notes.file_name, "notes.txt");
        assert!(!notes.inline);
        assert!(notes.id.ends_with("/1"));
        assert_eq!(notes.size, 5);
    }

    #[test]
    fn test_text_leaf_outside_alternative_is_attachment() {
        let raw = "Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            Hello\r\n\
            --b\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\
            \r\n\
            -- \r\n\
            Sent from a list footer\r\n\
            --b--\r\n";
        let result = extract(raw.as_bytes(), "m6", SignatureStatus::Unsigned).unwrap();
        assert_eq!(result.body.text, "Hello");
        assert_eq!(result.attachments.len(), 1);

        let footer = &result.attachments[0];
        assert_eq!(footer.attachment.mime_type, "text/plain");
        assert_eq!(footer.attachment.file_name, "attachment-0");
        assert!(footer.attachment.id.ends_with("/0"));
        assert_eq!(footer.content, b"-- \r\nSent from a list footer");
    }

    #[test]
    fn test_related_images_inside_alternative_are_attachments() {
        let raw = "Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
            \r\n\
            --alt\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            Plain\r\n\
            --alt\r\n\
            Content-Type: multipart/related; boundary=\"rel\"\r\n\
            \r\n\
            --rel\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            <img src=\"cid:dot\">\r\n\
            --rel\r\n\
            Content-Type: image/png\r\n\
            Content-ID: <dot>\r\n\
            \r\n\
            png\r\n\
            --rel--\r\n\
            --alt--\r\n";
        let result = extract(raw.as_bytes(), "m7", SignatureStatus::Unsigned).unwrap();
        assert_eq!(result.body.mime_type, "text/html");
        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.attachments[0].attachment.mime_type, "image/png");
        assert!(result.attachments[0].attachment.inline);
    }

    #[test]
    fn test_plain_single_part() {
        let raw = "Content-Type: text/plain\r\n\r\nJust text\r\n";
        let result = extract(raw.as_bytes(), "m2", SignatureStatus::Valid).unwrap();
        assert_eq!(result.body.text, "Just text\r\n");
        assert_eq!(result.body.mime_type, "text/plain");
        assert!(result.attachments.is_empty());
        assert!(result.signature.is_valid());
    }

    #[test]
    fn test_protected_headers_skipped() {
        let raw = "Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/rfc822-headers\r\n\
            \r\n\
            Subject: secret\r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            body\r\n\
            --b--\r\n";
        let result = extract(raw.as_bytes(), "m3", SignatureStatus::Unsigned).unwrap();
        assert_eq!(result.body.text, "body");
        assert!(result.attachments.is_empty());
    }

    #[test]
    fn test_undecodable_attachment_reported() {
        let raw = "Content-Type: multipart/mixed; boundary=\"b\"\r\n\
            \r\n\
            --b\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            body\r\n\
            --b\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Disposition: attachment; filename=\"broken.bin\"\r\n\
            Content-Transfer-Encoding: base64\r\n\
            \r\n\
            !!!!\r\n\
            --b\r\n\
            Content-Type: application/octet-stream\r\n\
            Content-Disposition: attachment; filename=\"ok.bin\"\r\n\
            \r\n\
            ok\r\n\
            --b--\r\n";
        let result = extract(raw.as_bytes(), "m4", SignatureStatus::Unsigned).unwrap();
        assert_eq!(result.failed_attachments.len(), 1);
        assert_eq!(result.failed_attachments[0].index, 0);
        assert_eq!(
            result.failed_attachments[0].file_name.as_deref(),
            Some("broken.bin")
        );
        assert_eq!(result.attachments.len(), 1);
        assert!(result.attachments[0].attachment.id.ends_with("/1"));
    }

    #[test]
    fn test_unparseable_payload_is_error() {
        let raw = "Content-Type: multipart/mixed; boundary=\"b\"\r\n\r\nno delimiters here\r\n";
        let err = extract(raw.as_bytes(), "m5", SignatureStatus::Unsigned).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::MimeAttachmentExtractionFailed(_)
        ));
    }
}

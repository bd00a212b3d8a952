//! Encrypted and opened message models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sealmail_crypto::{
    Attachment, AttachmentFailure, CipherText, MimeAttachment, SignatureStatus,
};

use crate::error::Error;

/// How the encrypted body is structured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyFormat {
    /// Inline PGP over a plain text body.
    #[default]
    PlainText,
    /// Inline PGP over an HTML body.
    Html,
    /// A whole MIME entity encrypted as one message.
    PgpMime,
}

/// A message as received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    /// Message identifier.
    pub id: String,
    /// Armored body.
    pub body: CipherText,
    /// Body structure.
    #[serde(default)]
    pub format: BodyFormat,
    /// Armored public keys of the sender, used for signature verification.
    #[serde(default)]
    pub sender_keys: Vec<String>,
    /// Claimed send time.
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

/// A successfully decrypted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Message identifier.
    pub id: String,
    /// Body as HTML; plain text bodies are converted.
    pub html: String,
    /// MIME type of the decrypted body before conversion.
    pub mime_type: String,
    /// Signature outcome.
    pub signature: SignatureStatus,
    /// Attachments found inside a PGP/MIME payload.
    pub attachments: Vec<MimeAttachment>,
    /// PGP/MIME attachment parts that could not be decoded.
    pub failed_attachments: Vec<AttachmentFailure>,
    /// Content-IDs the body references as `cid:` URIs.
    pub embedded_image_ids: Vec<String>,
}

impl DecryptedMessage {
    /// Returns the attachment records.
    pub fn attachment_records(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().map(|a| &a.attachment)
    }

    /// Returns true if the body references embedded images.
    #[must_use]
    pub fn has_embedded_images(&self) -> bool {
        !self.embedded_image_ids.is_empty()
    }
}

/// Outcome of opening a message.
///
/// A failure keeps the ciphertext so it can be shown with an error banner.
#[derive(Debug)]
pub enum OpenedMessage {
    /// The body was decrypted.
    Decrypted(DecryptedMessage),
    /// No key decrypted the body.
    Failed {
        /// The undecrypted body.
        ciphertext: CipherText,
        /// Why decryption failed.
        error: Error,
    },
}

impl OpenedMessage {
    /// Returns the decrypted message, if any.
    #[must_use]
    pub const fn decrypted(&self) -> Option<&DecryptedMessage> {
        match self {
            Self::Decrypted(message) => Some(message),
            Self::Failed { .. } => None,
        }
    }

    /// Returns true if decryption failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

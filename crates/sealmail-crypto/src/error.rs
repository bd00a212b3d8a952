//! Error types for decryption operations.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that can occur while resolving keys or decrypting a message.
///
/// Signature problems are not errors: they are reported through
/// [`crate::SignatureStatus`].
#[derive(Debug, Error)]
pub enum Error {
    /// No passphrase could be derived for an address key.
    #[error("Cannot derive passphrase for address key {key_id}")]
    PassphraseDerivationFailed {
        /// Identifier of the address key.
        key_id: String,
    },

    /// None of the candidate keys could decrypt the message.
    #[error("Decryption failed after trying {attempts} key(s)")]
    DecryptionFailed {
        /// Number of keys tried.
        attempts: usize,
    },

    /// The key ring for an address is empty.
    #[error("No keys available for address {0}")]
    NoKeys(String),

    /// The ciphertext is not a parseable OpenPGP message.
    #[error("Invalid OpenPGP message: {0}")]
    InvalidMessage(String),

    /// The decrypted PGP/MIME payload could not be split into parts.
    #[error("MIME attachment extraction failed: {0}")]
    MimeAttachmentExtractionFailed(#[from] sealmail_mime::Error),

    /// OpenPGP backend failure outside the cases above.
    #[error("OpenPGP backend error: {0}")]
    Backend(#[from] BackendError),

    /// A blocking decryption task panicked or was cancelled.
    #[error("Decryption task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

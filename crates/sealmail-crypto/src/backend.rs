//! The OpenPGP primitive seam.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::armor::CipherText;
use crate::keys::Passphrase;

/// Classification of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Input could not be parsed as OpenPGP data.
    Malformed,
    /// The message is not encrypted to the supplied key.
    NoMatchingKey,
    /// The private key could not be unlocked with the passphrase.
    Locked,
    /// Any other failure.
    Other,
}

/// Error reported by an [`OpenPgp`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    /// Failure class.
    pub kind: BackendErrorKind,
    /// Backend-specific detail.
    pub message: String,
}

impl BackendError {
    /// Creates a new backend error.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a [`BackendErrorKind::Malformed`] error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Malformed, message)
    }

    /// Returns true for malformed input.
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self.kind, BackendErrorKind::Malformed)
    }
}

/// Signature outcome as observed by the backend, before any time policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSignature {
    /// The message carried no signature.
    Absent,
    /// A signature is present but no verification keys were given.
    Unchecked,
    /// One of the verification keys validated the signature.
    Verified {
        /// Signature creation time, if recorded.
        created: Option<DateTime<Utc>>,
    },
    /// No verification key validated the signature.
    Mismatch(String),
}

/// Plaintext and signature outcome of one decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    /// Decrypted bytes.
    pub data: Vec<u8>,
    /// Signature outcome.
    pub signature: RawSignature,
}

/// OpenPGP primitives used by the decryption engine.
///
/// Keys are passed as armored text so implementations can cache parsed
/// material however they like.
pub trait OpenPgp: Send + Sync {
    /// Returns true if `passphrase` unlocks `private_key`.
    fn check_passphrase(&self, private_key: &str, passphrase: &Passphrase) -> bool;

    /// Decrypts `message` with one private key.
    ///
    /// If the message is signed and `verification_keys` is not empty, the
    /// signature is checked against each of them.
    ///
    /// # Errors
    ///
    /// Returns [`BackendErrorKind::Malformed`] for unparseable input,
    /// [`BackendErrorKind::Locked`] if the passphrase is wrong, and
    /// [`BackendErrorKind::NoMatchingKey`] if the message is not encrypted
    /// to this key.
    fn decrypt(
        &self,
        message: &CipherText,
        private_key: &str,
        passphrase: &Passphrase,
        verification_keys: &[String],
    ) -> Result<Decrypted, BackendError>;

    /// Verifies a detached `signature` over `data` against any of `keys`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendErrorKind::Malformed`] if the signature cannot be
    /// parsed.
    fn verify_detached(
        &self,
        data: &[u8],
        signature: &CipherText,
        keys: &[String],
    ) -> Result<bool, BackendError>;
}

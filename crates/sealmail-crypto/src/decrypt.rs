//! Message decryption with address-level key fallback.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::armor::CipherText;
use crate::backend::{BackendErrorKind, Decrypted, OpenPgp, RawSignature};
use crate::error::{Error, Result};
use crate::keyring::AddressKeyRing;
use crate::passphrase::TokenSignaturePolicy;
use crate::pgp_mime::{self, MimeDecryption};

/// Decryption settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptionConfig {
    /// How far a signature creation time may lie after the message time.
    pub signature_clock_skew_secs: u64,
    /// Handling of address key tokens whose signature does not verify.
    pub token_signature_policy: TokenSignaturePolicy,
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self {
            signature_clock_skew_secs: 24 * 60 * 60,
            token_signature_policy: TokenSignaturePolicy::default(),
        }
    }
}

/// Why a present signature was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureFailure {
    /// None of the verification keys matched the signature.
    NoMatchingKey,
    /// The signature claims to be made after the message was sent.
    FutureSignature {
        /// Signature creation time.
        created: DateTime<Utc>,
        /// Reference time the signature was checked against.
        reference: DateTime<Utc>,
    },
}

/// Outcome of signature verification for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The message carries no signature.
    Unsigned,
    /// A signature is present but no verification keys were supplied.
    Unchecked,
    /// The signature verified.
    Valid,
    /// The signature is present and did not verify.
    Invalid(SignatureFailure),
}

impl SignatureStatus {
    /// True if a signature was present and checked against keys.
    #[must_use]
    pub const fn has_signature(&self) -> bool {
        matches!(self, Self::Valid | Self::Invalid(_))
    }

    /// True if the signature verified.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    fn evaluate(raw: RawSignature, reference: DateTime<Utc>, skew: Duration) -> Self {
        match raw {
            RawSignature::Absent => Self::Unsigned,
            RawSignature::Unchecked => Self::Unchecked,
            RawSignature::Mismatch(reason) => {
                debug!(%reason, "Signature did not verify");
                Self::Invalid(SignatureFailure::NoMatchingKey)
            }
            RawSignature::Verified {
                created: Some(created),
            } if reference
                .checked_add_signed(skew)
                .is_some_and(|limit| created > limit) =>
            {
                warn!(%created, %reference, "Signature created after message time");
                Self::Invalid(SignatureFailure::FutureSignature { created, reference })
            }
            RawSignature::Verified { .. } => Self::Valid,
        }
    }
}

/// A decrypted single-part message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedText {
    /// Plaintext, with invalid UTF-8 replaced.
    pub text: String,
    /// Signature verification outcome.
    pub signature: SignatureStatus,
    /// Address key that decrypted the message.
    pub key_id: String,
}

/// Decrypts messages with the keys of one address.
///
/// Keys are tried in ring order, active before inactive, and the first key
/// that decrypts wins. Cloning is cheap.
#[derive(Clone)]
pub struct Decryptor {
    backend: Arc<dyn OpenPgp>,
    keyring: Arc<AddressKeyRing>,
    config: DecryptionConfig,
}

impl std::fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decryptor")
            .field("keys", &self.keyring.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Decryptor {
    /// Creates a decryptor over an unlocked key ring.
    #[must_use]
    pub fn new(backend: Arc<dyn OpenPgp>, keyring: AddressKeyRing, config: DecryptionConfig) -> Self {
        Self {
            backend,
            keyring: Arc::new(keyring),
            config,
        }
    }

    /// Returns the key ring.
    #[must_use]
    pub fn keyring(&self) -> &AddressKeyRing {
        &self.keyring
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DecryptionConfig {
        &self.config
    }

    /// Decrypts a single-part armored message.
    ///
    /// `message_time` is the reference time for the signature; "now" is used
    /// when it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessage`] if the ciphertext cannot be parsed
    /// and [`Error::DecryptionFailed`] if no key decrypts it.
    #[instrument(skip_all, fields(keys = self.keyring.len()))]
    pub fn decrypt(
        &self,
        ciphertext: &CipherText,
        verification_keys: &[String],
        message_time: Option<DateTime<Utc>>,
    ) -> Result<DecryptedText> {
        let (decrypted, key_id) = self.decrypt_with_fallback(ciphertext, verification_keys)?;
        let signature = self.signature_status(decrypted.signature, message_time);

        Ok(DecryptedText {
            text: String::from_utf8_lossy(&decrypted.data).into_owned(),
            signature,
            key_id,
        })
    }

    /// Decrypts a PGP/MIME message and extracts its body and attachments.
    ///
    /// # Errors
    ///
    /// Same as [`Decryptor::decrypt`], plus
    /// [`Error::MimeAttachmentExtractionFailed`] if the plaintext is not a
    /// parseable MIME entity.
    #[instrument(skip_all, fields(message_id = %message_id, keys = self.keyring.len()))]
    pub fn decrypt_mime(
        &self,
        ciphertext: &CipherText,
        verification_keys: &[String],
        message_time: Option<DateTime<Utc>>,
        message_id: &str,
    ) -> Result<MimeDecryption> {
        let (decrypted, key_id) = self.decrypt_with_fallback(ciphertext, verification_keys)?;
        let signature = self.signature_status(decrypted.signature, message_time);
        debug!(%key_id, "Extracting PGP/MIME parts");
        pgp_mime::extract(&decrypted.data, message_id, signature)
    }

    /// Runs [`Decryptor::decrypt`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`Decryptor::decrypt`], plus [`Error::Join`] if the task fails.
    pub async fn decrypt_async(
        &self,
        ciphertext: CipherText,
        verification_keys: Vec<String>,
        message_time: Option<DateTime<Utc>>,
    ) -> Result<DecryptedText> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.decrypt(&ciphertext, &verification_keys, message_time)
        })
        .await?
    }

    /// Runs [`Decryptor::decrypt_mime`] on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Same as [`Decryptor::decrypt_mime`], plus [`Error::Join`] if the task
    /// fails.
    pub async fn decrypt_mime_async(
        &self,
        ciphertext: CipherText,
        verification_keys: Vec<String>,
        message_time: Option<DateTime<Utc>>,
        message_id: String,
    ) -> Result<MimeDecryption> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.decrypt_mime(&ciphertext, &verification_keys, message_time, &message_id)
        })
        .await?
    }

    fn decrypt_with_fallback(
        &self,
        ciphertext: &CipherText,
        verification_keys: &[String],
    ) -> Result<(Decrypted, String)> {
        let mut attempts = 0;

        for candidate in self.keyring.candidates() {
            let key = candidate.key();
            attempts += 1;
            trace!(key_id = %key.key_id, active = candidate.is_active(), "Trying address key");

            match self
                .backend
                .decrypt(ciphertext, &key.private_key, &key.passphrase, verification_keys)
            {
                Ok(decrypted) => {
                    debug!(key_id = %key.key_id, attempts, "Message decrypted");
                    return Ok((decrypted, key.key_id.clone()));
                }
                Err(e) if e.kind == BackendErrorKind::Malformed => {
                    return Err(Error::InvalidMessage(e.message));
                }
                Err(e) => {
                    trace!(key_id = %key.key_id, error = %e, "Address key did not decrypt");
                }
            }
        }

        warn!(attempts, "No address key could decrypt the message");
        Err(Error::DecryptionFailed { attempts })
    }

    fn signature_status(
        &self,
        raw: RawSignature,
        message_time: Option<DateTime<Utc>>,
    ) -> SignatureStatus {
        let secs = i64::try_from(self.config.signature_clock_skew_secs).unwrap_or(i64::MAX);
        let skew = Duration::seconds(secs.min(i64::MAX / 1000));
        SignatureStatus::evaluate(raw, message_time.unwrap_or_else(Utc::now), skew)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_status_flags() {
        assert!(!SignatureStatus::Unsigned.has_signature());
        assert!(!SignatureStatus::Unchecked.has_signature());
        assert!(SignatureStatus::Valid.has_signature());
        assert!(SignatureStatus::Valid.is_valid());
        let invalid = SignatureStatus::Invalid(SignatureFailure::NoMatchingKey);
        assert!(invalid.has_signature());
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_signature_time_window() {
        let skew = Duration::seconds(60);
        let reference = at(1_000_000);

        let inside = RawSignature::Verified {
            created: Some(at(1_000_030)),
        };
        assert_eq!(
            SignatureStatus::evaluate(inside, reference, skew),
            SignatureStatus::Valid
        );

        let future = RawSignature::Verified {
            created: Some(at(1_000_061)),
        };
        assert!(matches!(
            SignatureStatus::evaluate(future, reference, skew),
            SignatureStatus::Invalid(SignatureFailure::FutureSignature { .. })
        ));

        let undated = RawSignature::Verified { created: None };
        assert!(SignatureStatus::evaluate(undated, reference, skew).is_valid());
    }

    #[test]
    fn test_mismatch_is_invalid() {
        let status = SignatureStatus::evaluate(
            RawSignature::Mismatch("bad".to_string()),
            at(0),
            Duration::zero(),
        );
        assert_eq!(status, SignatureStatus::Invalid(SignatureFailure::NoMatchingKey));
    }

    #[test]
    fn test_config_defaults() {
        let config = DecryptionConfig::default();
        assert_eq!(config.signature_clock_skew_secs, 86_400);
        assert_eq!(config.token_signature_policy, TokenSignaturePolicy::Tolerate);
    }
}

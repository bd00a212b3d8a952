//! [`OpenPgp`] implemented with the pure Rust `pgp` crate.

use std::borrow::Borrow;

use chrono::{DateTime, Utc};
use pgp::types::{PublicKeyTrait, SecretKeyTrait};
use pgp::{Deserializable, Message, SignedPublicKey, SignedSecretKey, StandaloneSignature};
use tracing::trace;
use zeroize::Zeroizing;

use crate::armor::CipherText;
use crate::backend::{BackendError, BackendErrorKind, Decrypted, OpenPgp, RawSignature};
use crate::keys::Passphrase;

/// OpenPGP backend on top of rpgp.
#[derive(Debug, Clone, Copy, Default)]
pub struct RpgpBackend;

impl RpgpBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl OpenPgp for RpgpBackend {
    fn check_passphrase(&self, private_key: &str, passphrase: &Passphrase) -> bool {
        let Ok(key) = parse_secret_key(private_key) else {
            return false;
        };
        unlock(&key, passphrase).is_ok()
    }

    fn decrypt(
        &self,
        message: &CipherText,
        private_key: &str,
        passphrase: &Passphrase,
        verification_keys: &[String],
    ) -> Result<Decrypted, BackendError> {
        let (encrypted, _headers) = Message::from_string(message.as_str())
            .map_err(|e| BackendError::malformed(e.to_string()))?;
        let key = parse_secret_key(private_key)?;
        unlock(&key, passphrase)?;

        let password = password(passphrase);
        let (decrypted, _key_ids) = encrypted
            .decrypt(move || password.to_string(), &[&key])
            .map_err(|e| BackendError::new(BackendErrorKind::NoMatchingKey, e.to_string()))?;
        let decrypted = decompress(decrypted)?;

        let signature = match &decrypted {
            Message::Signed { signature, .. } => {
                if verification_keys.is_empty() {
                    RawSignature::Unchecked
                } else if verified_by_any(&decrypted, verification_keys) {
                    RawSignature::Verified {
                        created: signature.created().map(to_utc),
                    }
                } else {
                    RawSignature::Mismatch("no verification key matched".to_string())
                }
            }
            _ => RawSignature::Absent,
        };

        let data = decrypted
            .get_content()
            .map_err(|e| BackendError::new(BackendErrorKind::Other, e.to_string()))?
            .unwrap_or_default();

        Ok(Decrypted { data, signature })
    }

    fn verify_detached(
        &self,
        data: &[u8],
        signature: &CipherText,
        keys: &[String],
    ) -> Result<bool, BackendError> {
        let (signature, _headers) = StandaloneSignature::from_string(signature.as_str())
            .map_err(|e| BackendError::malformed(e.to_string()))?;
        Ok(verified_by_any(
            &Detached {
                signature: &signature,
                data,
            },
            keys,
        ))
    }
}

/// Something whose signature can be checked against one public key.
trait Verifiable {
    fn verify_with(&self, key: &impl PublicKeyTrait) -> bool;
}

impl Verifiable for Message {
    fn verify_with(&self, key: &impl PublicKeyTrait) -> bool {
        self.verify(key).is_ok()
    }
}

struct Detached<'a> {
    signature: &'a StandaloneSignature,
    data: &'a [u8],
}

impl Verifiable for Detached<'_> {
    fn verify_with(&self, key: &impl PublicKeyTrait) -> bool {
        self.signature.verify(key, self.data).is_ok()
    }
}

/// Checks `target` against the primary key and subkeys of each armored key,
/// public or secret.
fn verified_by_any(target: &impl Verifiable, armored_keys: &[String]) -> bool {
    armored_keys.iter().any(|armored| {
        if let Ok((public, _)) = SignedPublicKey::from_string(armored) {
            return target.verify_with(&public)
                || public
                    .public_subkeys
                    .iter()
                    .any(|subkey| target.verify_with(&subkey.key));
        }
        if let Ok((secret, _)) = SignedSecretKey::from_string(armored) {
            return target.verify_with(&secret.public_key())
                || secret
                    .secret_subkeys
                    .iter()
                    .any(|subkey| target.verify_with(&subkey.key.public_key()));
        }
        trace!("Verification key could not be parsed");
        false
    })
}

fn parse_secret_key(armored: &str) -> Result<SignedSecretKey, BackendError> {
    SignedSecretKey::from_string(armored)
        .map(|(key, _headers)| key)
        .map_err(|e| BackendError::new(BackendErrorKind::Other, format!("private key: {e}")))
}

fn unlock(key: &SignedSecretKey, passphrase: &Passphrase) -> Result<(), BackendError> {
    let password = password(passphrase);
    key.unlock(move || password.to_string(), |_| Ok(()))
        .map_err(|e| BackendError::new(BackendErrorKind::Locked, e.to_string()))
}

fn password(passphrase: &Passphrase) -> Zeroizing<String> {
    Zeroizing::new(String::from_utf8_lossy(passphrase.as_bytes()).into_owned())
}

fn decompress(mut message: Message) -> Result<Message, BackendError> {
    while matches!(message, Message::Compressed(_)) {
        message = message
            .decompress()
            .map_err(|e| BackendError::new(BackendErrorKind::Other, e.to_string()))?;
    }
    Ok(message)
}

fn to_utc(created: impl Borrow<DateTime<Utc>>) -> DateTime<Utc> {
    *created.borrow()
}

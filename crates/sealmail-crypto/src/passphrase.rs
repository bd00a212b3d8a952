//! Address key passphrase derivation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::armor::{ArmorKind, CipherText};
use crate::backend::OpenPgp;
use crate::keys::{KeyCandidate, Passphrase, UserKey, order_candidates};

/// What to do when the token signature of an address key does not verify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSignaturePolicy {
    /// Log a warning and use the decrypted token anyway.
    #[default]
    Tolerate,
    /// Reject the token.
    Require,
}

/// Returns true if `passphrase` unlocks `private_key`.
pub fn check_passphrase(backend: &dyn OpenPgp, private_key: &str, passphrase: &Passphrase) -> bool {
    backend.check_passphrase(private_key, passphrase)
}

/// Derives the passphrase of an address key from its encrypted token.
///
/// The token is decrypted with the first user key (active keys first) that
/// the mailbox passphrase unlocks. The plaintext bytes are the address key
/// passphrase. The detached `signature` is then checked against all user
/// keys and handled according to `policy`.
///
/// Returns `None` when the token is malformed, when no user key can decrypt
/// it, or when the signature is rejected under
/// [`TokenSignaturePolicy::Require`].
pub fn derive_address_passphrase(
    backend: &dyn OpenPgp,
    mailbox_passphrase: &Passphrase,
    token: &CipherText,
    signature: Option<&CipherText>,
    user_keys: &[UserKey],
    policy: TokenSignaturePolicy,
) -> Option<Passphrase> {
    if token.kind() != ArmorKind::Message {
        warn!(kind = ?token.kind(), "Address key token is not an armored message");
        return None;
    }

    let decrypted = order_candidates(user_keys)
        .into_iter()
        .map(KeyCandidate::into_key)
        .filter(|key| backend.check_passphrase(&key.private_key, mailbox_passphrase))
        .find_map(|key| {
            match backend.decrypt(token, &key.private_key, mailbox_passphrase, &[]) {
                Ok(decrypted) => {
                    debug!(user_key = %key.id, "Decrypted address key token");
                    Some(Ok(decrypted.data))
                }
                Err(e) if e.is_malformed() => Some(Err(e)),
                Err(e) => {
                    debug!(user_key = %key.id, error = %e, "User key cannot decrypt token");
                    None
                }
            }
        });

    let token_bytes = match decrypted {
        Some(Ok(bytes)) => Passphrase::new(bytes),
        Some(Err(e)) => {
            warn!(error = %e, "Address key token is malformed");
            return None;
        }
        None => {
            debug!("No user key could decrypt the address key token");
            return None;
        }
    };

    if token_signature_accepted(backend, &token_bytes, signature, user_keys, policy) {
        Some(token_bytes)
    } else {
        None
    }
}

fn token_signature_accepted(
    backend: &dyn OpenPgp,
    token: &Passphrase,
    signature: Option<&CipherText>,
    user_keys: &[UserKey],
    policy: TokenSignaturePolicy,
) -> bool {
    let verification_keys: Vec<String> = user_keys
        .iter()
        .map(|key| key.private_key.clone())
        .collect();

    let verified = signature.is_some_and(|signature| {
        backend
            .verify_detached(token.as_bytes(), signature, &verification_keys)
            .unwrap_or_else(|e| {
                debug!(error = %e, "Token signature could not be checked");
                false
            })
    });

    match (verified, policy) {
        (true, _) => true,
        (false, TokenSignaturePolicy::Tolerate) => {
            warn!(
                signed = signature.is_some(),
                "Address key token signature did not verify; using token anyway"
            );
            true
        }
        (false, TokenSignaturePolicy::Require) => {
            warn!(
                signed = signature.is_some(),
                "Address key token signature did not verify; rejecting token"
            );
            false
        }
    }
}

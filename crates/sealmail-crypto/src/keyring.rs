//! Unlocked address keys in decryption order.

use std::fmt;

use tracing::{debug, info, warn};

use crate::backend::OpenPgp;
use crate::error::{Error, Result};
use crate::keys::{AddressKey, KeyCandidate, KeyStore, Passphrase, UserKey, order_candidates};
use crate::passphrase::{TokenSignaturePolicy, derive_address_passphrase};

/// An address key together with the passphrase that unlocks it.
#[derive(Clone)]
pub struct UnlockedKey {
    /// Address key identifier.
    pub key_id: String,
    /// Armored private key.
    pub private_key: String,
    /// Passphrase of `private_key`.
    pub passphrase: Passphrase,
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// The address keys of one address, unlocked and ordered for decryption.
#[derive(Debug, Clone, Default)]
pub struct AddressKeyRing {
    candidates: Vec<KeyCandidate<UnlockedKey>>,
}

impl AddressKeyRing {
    /// Unlocks the keys of one address.
    ///
    /// Keys with a token get their passphrase from
    /// [`derive_address_passphrase`]; legacy keys without a token use the
    /// mailbox passphrase directly. Keys that cannot be unlocked are skipped
    /// so that older messages can still be read with the remaining ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoKeys`] if `address_keys` is empty and
    /// [`Error::PassphraseDerivationFailed`] if no key could be unlocked.
    pub fn resolve(
        backend: &dyn OpenPgp,
        mailbox_passphrase: &Passphrase,
        user_keys: &[UserKey],
        address_keys: Vec<AddressKey>,
        policy: TokenSignaturePolicy,
    ) -> Result<Self> {
        let Some(first_id) = address_keys.first().map(|key| key.id.clone()) else {
            return Err(Error::NoKeys("address has no keys".to_string()));
        };
        let total = address_keys.len();

        let candidates: Vec<_> = order_candidates(address_keys)
            .into_iter()
            .filter_map(|candidate| {
                let active = candidate.is_active();
                let key = candidate.into_key();
                let unlocked = unlock(backend, mailbox_passphrase, user_keys, key, policy)?;
                Some(if active {
                    KeyCandidate::Active(unlocked)
                } else {
                    KeyCandidate::Inactive(unlocked)
                })
            })
            .collect();

        if candidates.is_empty() {
            return Err(Error::PassphraseDerivationFailed { key_id: first_id });
        }

        info!(unlocked = candidates.len(), total, "Resolved address key ring");
        Ok(Self { candidates })
    }

    /// Unlocks the keys of `address_id` from a [`KeyStore`].
    ///
    /// # Errors
    ///
    /// Same as [`AddressKeyRing::resolve`]; [`Error::NoKeys`] names the address.
    pub fn from_store(
        backend: &dyn OpenPgp,
        store: &dyn KeyStore,
        address_id: &str,
        mailbox_passphrase: &Passphrase,
        policy: TokenSignaturePolicy,
    ) -> Result<Self> {
        let address_keys = store.address_keys(address_id);
        if address_keys.is_empty() {
            return Err(Error::NoKeys(address_id.to_string()));
        }
        Self::resolve(
            backend,
            mailbox_passphrase,
            &store.user_keys(),
            address_keys,
            policy,
        )
    }

    /// Builds a ring from already unlocked keys, kept in the given order.
    #[must_use]
    pub const fn from_candidates(candidates: Vec<KeyCandidate<UnlockedKey>>) -> Self {
        Self { candidates }
    }

    /// Returns the keys in decryption order.
    #[must_use]
    pub fn candidates(&self) -> &[KeyCandidate<UnlockedKey>] {
        &self.candidates
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns true if the ring holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn unlock(
    backend: &dyn OpenPgp,
    mailbox_passphrase: &Passphrase,
    user_keys: &[UserKey],
    key: AddressKey,
    policy: TokenSignaturePolicy,
) -> Option<UnlockedKey> {
    let passphrase = match &key.token {
        Some(token) => derive_address_passphrase(
            backend,
            mailbox_passphrase,
            token,
            key.signature.as_ref(),
            user_keys,
            policy,
        ),
        None => {
            debug!(key_id = %key.id, "Legacy address key, using mailbox passphrase");
            Some(mailbox_passphrase.clone())
        }
    };

    let Some(passphrase) = passphrase else {
        warn!(key_id = %key.id, "Cannot derive passphrase for address key");
        return None;
    };

    if !backend.check_passphrase(&key.private_key, &passphrase) {
        warn!(key_id = %key.id, "Derived passphrase does not unlock address key");
        return None;
    }

    Some(UnlockedKey {
        key_id: key.id,
        private_key: key.private_key,
        passphrase,
    })
}

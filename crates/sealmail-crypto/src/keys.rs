//! User and address key material and the order in which keys are tried.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::armor::CipherText;

/// Secret passphrase bytes, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(Zeroizing<Vec<u8>>);

impl Passphrase {
    /// Wraps raw passphrase bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

/// A key belonging to the account as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKey {
    /// Key identifier.
    pub id: String,
    /// Armored OpenPGP private key.
    pub private_key: String,
    /// Whether the key is in active use.
    pub active: bool,
    /// Lower values are tried first.
    pub priority: u32,
}

/// A key bound to one email address.
///
/// Modern address keys are locked with a random passphrase that is itself
/// encrypted to the user keys (`token`) and signed by them (`signature`).
/// Legacy keys have neither and are locked with the mailbox passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressKey {
    /// Key identifier.
    pub id: String,
    /// Armored OpenPGP private key.
    pub private_key: String,
    /// Encrypted passphrase of this key.
    #[serde(default)]
    pub token: Option<CipherText>,
    /// Detached signature over the decrypted token.
    #[serde(default)]
    pub signature: Option<CipherText>,
    /// Whether the key is in active use.
    pub active: bool,
    /// Lower values are tried first.
    pub priority: u32,
}

/// Something with an active flag and a priority.
pub trait Prioritized {
    /// Whether the key is in active use.
    fn is_active(&self) -> bool;
    /// Lower values are tried first.
    fn priority(&self) -> u32;
}

impl Prioritized for UserKey {
    fn is_active(&self) -> bool {
        self.active
    }

    fn priority(&self) -> u32 {
        self.priority
    }
}

impl Prioritized for AddressKey {
    fn is_active(&self) -> bool {
        self.active
    }

    fn priority(&self) -> u32 {
        self.priority
    }
}

impl<T: Prioritized> Prioritized for &T {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn priority(&self) -> u32 {
        (**self).priority()
    }
}

/// A key tagged with its eligibility.
///
/// Both variants are decryption candidates; only active keys may be used
/// for new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCandidate<K> {
    /// Key in active use.
    Active(K),
    /// Rotated-out key, kept to read older messages.
    Inactive(K),
}

impl<K> KeyCandidate<K> {
    /// Returns the wrapped key.
    pub const fn key(&self) -> &K {
        match self {
            Self::Active(key) | Self::Inactive(key) => key,
        }
    }

    /// Unwraps the key.
    pub fn into_key(self) -> K {
        match self {
            Self::Active(key) | Self::Inactive(key) => key,
        }
    }

    /// Returns true for [`KeyCandidate::Active`].
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Maps the key, keeping the tag.
    pub fn map<T>(self, f: impl FnOnce(K) -> T) -> KeyCandidate<T> {
        match self {
            Self::Active(key) => KeyCandidate::Active(f(key)),
            Self::Inactive(key) => KeyCandidate::Inactive(f(key)),
        }
    }
}

/// Orders keys for decryption: active keys first, then inactive ones,
/// each group by ascending priority. Ties keep their input order.
///
/// Inactive keys are never dropped.
pub fn order_candidates<K: Prioritized>(keys: impl IntoIterator<Item = K>) -> Vec<KeyCandidate<K>> {
    let (mut active, mut inactive): (Vec<K>, Vec<K>) =
        keys.into_iter().partition(Prioritized::is_active);
    active.sort_by_key(Prioritized::priority);
    inactive.sort_by_key(Prioritized::priority);

    active
        .into_iter()
        .map(KeyCandidate::Active)
        .chain(inactive.into_iter().map(KeyCandidate::Inactive))
        .collect()
}

/// Source of key material for the signed-in user.
pub trait KeyStore: Send + Sync {
    /// Returns the user keys.
    fn user_keys(&self) -> Vec<UserKey>;

    /// Returns the keys of one address.
    fn address_keys(&self, address_id: &str) -> Vec<AddressKey>;
}

/// In-memory [`KeyStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    user_keys: Vec<UserKey>,
    address_keys: HashMap<String, Vec<AddressKey>>,
}

impl MemoryKeyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user key.
    #[must_use]
    pub fn with_user_key(mut self, key: UserKey) -> Self {
        self.user_keys.push(key);
        self
    }

    /// Adds a key to an address.
    #[must_use]
    pub fn with_address_key(mut self, address_id: impl Into<String>, key: AddressKey) -> Self {
        self.address_keys
            .entry(address_id.into())
            .or_default()
            .push(key);
        self
    }
}

impl KeyStore for MemoryKeyStore {
    fn user_keys(&self) -> Vec<UserKey> {
        self.user_keys.clone()
    }

    fn address_keys(&self, address_id: &str) -> Vec<AddressKey> {
        self.address_keys
            .get(address_id)
            .cloned()
            .unwrap_or_default()
    }
}

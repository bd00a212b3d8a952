//! Mailbox passphrase storage using the system keyring.
//!
//! The mailbox passphrase unlocks the user keys, so it is stored in the
//! platform's native credential storage:
//! - Linux: kernel keyutils
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::{debug, warn};

use sealmail_crypto::Passphrase;

use crate::error::Result;

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "sealmail";

/// Credential type identifier for mailbox passphrases.
const MAILBOX_CREDENTIAL: &str = "mailbox";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// User ID is required for credential operations.
    #[error("User ID is required for credential storage")]
    MissingUserId,
}

fn entry(user_id: &str) -> Result<Entry> {
    if user_id.trim().is_empty() {
        return Err(CredentialError::MissingUserId.into());
    }
    let key = format!("{SERVICE_NAME}_{MAILBOX_CREDENTIAL}_{user_id}");
    Ok(Entry::new(SERVICE_NAME, &key).map_err(CredentialError::from)?)
}

/// Stores the mailbox passphrase of a user.
///
/// # Errors
///
/// Returns an error if the user id is blank or the keyring operation fails.
pub fn store_mailbox_passphrase(user_id: &str, passphrase: &Passphrase) -> Result<()> {
    entry(user_id)?
        .set_secret(passphrase.as_bytes())
        .map_err(CredentialError::from)?;
    debug!(user_id, "Stored mailbox passphrase");
    Ok(())
}

/// Retrieves the mailbox passphrase of a user.
///
/// # Errors
///
/// Returns an error if the user id is blank or the keyring operation fails.
pub fn get_mailbox_passphrase(user_id: &str) -> Result<Option<Passphrase>> {
    match entry(user_id)?.get_secret() {
        Ok(secret) => Ok(Some(Passphrase::new(secret))),
        Err(keyring::Error::NoEntry) => {
            debug!(user_id, "No mailbox passphrase found");
            Ok(None)
        }
        Err(e) => Err(CredentialError::from(e).into()),
    }
}

/// Deletes the mailbox passphrase of a user.
///
/// A missing entry is not an error.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn delete_mailbox_passphrase(user_id: &str) -> Result<()> {
    match entry(user_id)?.delete_credential() {
        Ok(()) => debug!(user_id, "Deleted mailbox passphrase"),
        Err(keyring::Error::NoEntry) => debug!(user_id, "No mailbox passphrase to delete"),
        Err(e) => {
            warn!("Failed to delete mailbox passphrase: {e}");
            return Err(CredentialError::from(e).into());
        }
    }
    Ok(())
}

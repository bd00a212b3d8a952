//! # sealmail-crypto
//!
//! Decryption of end-to-end encrypted mail bodies.
//!
//! This crate provides:
//! - **Key model**: user and address keys with an explicit
//!   active/inactive priority policy ([`KeyCandidate`], [`order_candidates`])
//! - **Passphrase derivation**: unlocking address keys from the mailbox
//!   passphrase through their encrypted token ([`derive_address_passphrase`])
//! - **Message decryption**: single-part armored messages and PGP/MIME
//!   messages with attachment extraction ([`Decryptor`])
//! - **Backend seam**: the [`OpenPgp`] trait isolates the OpenPGP
//!   primitives; [`RpgpBackend`] implements it with the pure Rust `pgp` crate
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sealmail_crypto::{AddressKeyRing, CipherText, DecryptionConfig, Decryptor, RpgpBackend};
//!
//! let backend = Arc::new(RpgpBackend::new());
//! let keyring = AddressKeyRing::resolve(
//!     backend.as_ref(),
//!     &mailbox_passphrase,
//!     &user_keys,
//!     address_keys,
//!     TokenSignaturePolicy::default(),
//! )?;
//! let decryptor = Decryptor::new(backend, keyring, DecryptionConfig::default());
//!
//! let text = decryptor.decrypt(&CipherText::new(armored), &sender_keys, Some(sent_at))?;
//! println!("signed: {}", text.signature.is_valid());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod armor;
pub mod attachment;
mod backend;
mod decrypt;
mod error;
mod keyring;
mod keys;
mod passphrase;
mod pgp_mime;
mod rpgp;

pub use armor::{ArmorKind, CipherText};
pub use attachment::{
    Attachment, INLINE_RASTER_TYPES, PGP_ATTACHMENT_PREFIX, extract_embedded_image_ids,
    normalize_content_id, pgp_attachment_id,
};
pub use backend::{BackendError, BackendErrorKind, Decrypted, OpenPgp, RawSignature};
pub use decrypt::{
    DecryptedText, DecryptionConfig, Decryptor, SignatureFailure, SignatureStatus,
};
pub use error::{Error, Result};
pub use keyring::{AddressKeyRing, UnlockedKey};
pub use keys::{
    AddressKey, KeyCandidate, KeyStore, MemoryKeyStore, Passphrase, Prioritized, UserKey,
    order_candidates,
};
pub use passphrase::{TokenSignaturePolicy, check_passphrase, derive_address_passphrase};
pub use pgp_mime::{AttachmentFailure, MimeAttachment, MimeBody, MimeDecryption};
pub use rpgp::RpgpBackend;

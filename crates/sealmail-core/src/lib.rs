//! # sealmail-core
//!
//! Message-level services for the sealmail client.
//!
//! This crate provides:
//! - **Opening messages**: decrypting inline PGP and PGP/MIME bodies into
//!   displayable HTML with signature status and attachments
//!   ([`MessageService::open`])
//! - **Attachment storage**: writing decrypted attachments to a per-message
//!   directory
//! - **Render sessions**: inlining the body's embedded images
//! - **Configuration**: a JSON configuration file
//! - **Credentials**: mailbox passphrase storage in the system keyring

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod body;
mod config;
pub mod credentials;
mod error;
mod message;
mod service;
pub mod storage;

pub use body::text_to_html;
pub use config::Config;
pub use credentials::CredentialError;
pub use error::{Error, Result};
pub use message::{BodyFormat, DecryptedMessage, EncryptedMessage, OpenedMessage};
pub use service::{MessageService, RenderSession};
pub use storage::{StoredAttachment, embedded_images, store_attachments};

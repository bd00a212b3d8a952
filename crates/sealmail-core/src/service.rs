//! Message service.
//!
//! Opens encrypted messages end to end and starts render sessions for
//! their embedded images.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use sealmail_crypto::{
    AddressKeyRing, Decryptor, KeyStore, MimeDecryption, OpenPgp, Passphrase,
    extract_embedded_image_ids,
};
use sealmail_render::{EmbeddedImage, ImageRenderer, RenderedMessage};

use crate::body::text_to_html;
use crate::config::Config;
use crate::error::Result;
use crate::message::{BodyFormat, DecryptedMessage, EncryptedMessage, OpenedMessage};
use crate::storage::{self, StoredAttachment};

const TEXT_PLAIN: &str = "text/plain";
const TEXT_HTML: &str = "text/html";

/// Decrypts and renders the messages of one address.
#[derive(Debug, Clone)]
pub struct MessageService {
    decryptor: Decryptor,
    config: Config,
}

/// A running render session.
#[derive(Debug)]
pub struct RenderSession {
    /// Renderer handle; dropping it stops the session.
    pub renderer: ImageRenderer,
    /// Rendered documents, one per pass.
    pub rendered: mpsc::Receiver<RenderedMessage>,
}

impl MessageService {
    /// Creates a service over a ready decryptor.
    #[must_use]
    pub const fn new(decryptor: Decryptor, config: Config) -> Self {
        Self { decryptor, config }
    }

    /// Unlocks the keys of `address_id` and creates a service for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address has no keys or none can be unlocked
    /// with the mailbox passphrase.
    pub fn from_store(
        backend: Arc<dyn OpenPgp>,
        store: &dyn KeyStore,
        address_id: &str,
        mailbox_passphrase: &Passphrase,
        config: Config,
    ) -> Result<Self> {
        let keyring = AddressKeyRing::from_store(
            backend.as_ref(),
            store,
            address_id,
            mailbox_passphrase,
            config.decryption.token_signature_policy,
        )?;
        info!(address_id, keys = keyring.len(), "Address keys unlocked");
        let decryptor = Decryptor::new(backend, keyring, config.decryption.clone());
        Ok(Self::new(decryptor, config))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the decryptor.
    #[must_use]
    pub const fn decryptor(&self) -> &Decryptor {
        &self.decryptor
    }

    /// Decrypts a message.
    ///
    /// Never fails: an undecryptable message comes back as
    /// [`OpenedMessage::Failed`] with its ciphertext.
    #[instrument(skip_all, fields(message_id = %message.id, format = ?message.format))]
    pub async fn open(&self, message: &EncryptedMessage) -> OpenedMessage {
        match self.decrypt(message).await {
            Ok(decrypted) => {
                debug!(
                    attachments = decrypted.attachments.len(),
                    embedded = decrypted.embedded_image_ids.len(),
                    "Message opened"
                );
                OpenedMessage::Decrypted(decrypted)
            }
            Err(error) => {
                warn!(%error, "Cannot decrypt message");
                OpenedMessage::Failed {
                    ciphertext: message.body.clone(),
                    error,
                }
            }
        }
    }

    async fn decrypt(&self, message: &EncryptedMessage) -> Result<DecryptedMessage> {
        if message.format == BodyFormat::PgpMime {
            let mime = self
                .decryptor
                .decrypt_mime_async(
                    message.body.clone(),
                    message.sender_keys.clone(),
                    message.sent_at,
                    message.id.clone(),
                )
                .await?;
            return Ok(from_mime(message.id.clone(), mime));
        }

        let text = self
            .decryptor
            .decrypt_async(
                message.body.clone(),
                message.sender_keys.clone(),
                message.sent_at,
            )
            .await?;
        let (html, mime_type) = if message.format == BodyFormat::PlainText {
            (text_to_html(&text.text), TEXT_PLAIN)
        } else {
            (text.text, TEXT_HTML)
        };
        Ok(DecryptedMessage {
            id: message.id.clone(),
            embedded_image_ids: extract_embedded_image_ids(&html),
            html,
            mime_type: mime_type.to_string(),
            signature: text.signature,
            attachments: Vec::new(),
            failed_attachments: Vec::new(),
        })
    }

    /// Writes the attachments of a decrypted message into its attachment
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be determined or written.
    pub async fn store_attachments(&self, message: &DecryptedMessage) -> Result<Vec<StoredAttachment>> {
        let dir = self.config.attachments_dir_for(&message.id)?;
        storage::store_attachments(&dir, message).await
    }

    /// Starts a renderer for the body of `message` and queues `images`.
    ///
    /// The session stops when `scope` is cancelled or the renderer is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the renderer rejects the initial batch.
    pub fn render(
        &self,
        message: &DecryptedMessage,
        images: Vec<EmbeddedImage>,
        scope: &CancellationToken,
    ) -> Result<RenderSession> {
        let (renderer, rendered) = ImageRenderer::builder(message.id.as_str(), message.html.as_str())
            .config(self.config.renderer.clone())
            .cancel_on(scope)
            .spawn();
        if !images.is_empty() {
            renderer.submit(images)?;
        }
        Ok(RenderSession { renderer, rendered })
    }

    /// Stores the attachments of `message` and renders the images its body
    /// references.
    ///
    /// # Errors
    ///
    /// Same as [`MessageService::store_attachments`] and
    /// [`MessageService::render`].
    pub async fn render_embedded(
        &self,
        message: &DecryptedMessage,
        scope: &CancellationToken,
    ) -> Result<RenderSession> {
        let stored = self.store_attachments(message).await?;
        let images = storage::embedded_images(message, &stored);
        debug!(message_id = %message.id, images = images.len(), "Rendering embedded images");
        self.render(message, images, scope)
    }
}

fn from_mime(id: String, mime: MimeDecryption) -> DecryptedMessage {
    let html = if mime.body.mime_type == TEXT_PLAIN {
        text_to_html(&mime.body.text)
    } else {
        mime.body.text
    };
    DecryptedMessage {
        id,
        html,
        mime_type: mime.body.mime_type,
        signature: mime.signature,
        attachments: mime.attachments,
        failed_attachments: mime.failed_attachments,
        embedded_image_ids: mime.embedded_image_ids,
    }
}

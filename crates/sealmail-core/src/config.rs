//! Configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use sealmail_crypto::DecryptionConfig;
use sealmail_render::RendererConfig;

use crate::error::{Error, Result};
use crate::storage::sanitize_component;

/// Directory below the platform data directory used for attachments.
const APP_DIR: &str = "sealmail";

/// Client configuration.
///
/// Every field has a default, so a partial JSON file is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decryption settings.
    pub decryption: DecryptionConfig,
    /// Embedded image renderer settings.
    pub renderer: RendererConfig,
    /// Root of the per-message attachment directories.
    ///
    /// Defaults to `<data-local-dir>/sealmail/attachments`.
    pub attachments_dir: Option<PathBuf>,
}

impl Config {
    /// Loads the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Loads the configuration, falling back to defaults when the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        match Self::load(path) {
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            other => other,
        }
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Root directory for attachments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no directory is configured and the
    /// platform has no local data directory.
    pub fn attachments_root(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.attachments_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR).join("attachments"))
            .ok_or_else(|| Error::Config("no local data directory".to_string()))
    }

    /// Attachment directory of one message.
    ///
    /// # Errors
    ///
    /// Same as [`Config::attachments_root`].
    pub fn attachments_dir_for(&self, message_id: &str) -> Result<PathBuf> {
        Ok(self.attachments_root()?.join(sanitize_component(message_id)))
    }
}

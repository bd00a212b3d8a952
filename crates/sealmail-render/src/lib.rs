//! # sealmail-render
//!
//! Inlines the embedded images of a decrypted HTML body.
//!
//! Images referenced by `cid:` URLs live on disk after attachment
//! extraction. An [`ImageRenderer`] collects them in debounced batches,
//! downsamples and re-encodes them as JPEG on a worker pool sized to the
//! CPU count, and splices the results into the document as `data:` URIs.
//! Each pass emits the full document as a [`RenderedMessage`].
//!
//! ## Example
//!
//! ```ignore
//! use sealmail_render::{EmbeddedImage, ImageRenderer, RendererConfig};
//!
//! let (renderer, mut rendered) = ImageRenderer::builder("msg-1", html)
//!     .config(RendererConfig::default())
//!     .spawn();
//!
//! renderer.submit(vec![EmbeddedImage::new(
//!     "<logo@example.com>",
//!     "/tmp/attachments/msg-1/logo.png",
//!     "binary",
//!     "image/png",
//!     "msg-1",
//! )])?;
//!
//! while let Some(message) = rendered.recv().await {
//!     display(&message.html);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod compress;
mod config;
mod document;
mod embedded;
mod error;
mod pipeline;

pub use config::{
    DEFAULT_DEBOUNCE, DEFAULT_JPEG_QUALITY, DEFAULT_PER_IMAGE_CAP_BYTES,
    DEFAULT_TOTAL_BUDGET_BYTES, RendererConfig, RendererConfigBuilder,
};
pub use document::HtmlDocument;
pub use embedded::EmbeddedImage;
pub use error::{Error, Result};
pub use pipeline::{ImageRenderer, ImageRendererBuilder, RenderStats, RenderedMessage};

//! # sealmail-mime
//!
//! MIME entity parsing for the plaintext that comes out of a PGP/MIME
//! decryption.
//!
//! ## Features
//!
//! - **Entity parsing**: Parse a MIME entity into a tree of parts, recursing
//!   through nested `multipart/*` bodies
//! - **Decoding**: Base64, Quoted-Printable, RFC 2047 encoded words
//! - **Content types**: `type/subtype; param=value` handling
//! - **Dispositions**: `inline` / `attachment` with file names
//!
//! ## Quick Start
//!
//! ```
//! use sealmail_mime::Message;
//!
//! let raw = "Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
//!            \r\n\
//!            --b1\r\n\
//!            Content-Type: text/plain\r\n\
//!            \r\n\
//!            Hello\r\n\
//!            --b1\r\n\
//!            Content-Type: application/pdf\r\n\
//!            Content-Disposition: attachment; filename=\"a.pdf\"\r\n\
//!            Content-Transfer-Encoding: base64\r\n\
//!            \r\n\
//!            JVBERi0=\r\n\
//!            --b1--\r\n";
//!
//! let message = Message::parse(raw.as_bytes()).unwrap();
//! let leaves: Vec<_> = message.leaves().collect();
//! assert_eq!(leaves.len(), 2);
//! assert_eq!(leaves[0].body_text().unwrap(), "Hello");
//! assert_eq!(leaves[1].file_name().as_deref(), Some("a.pdf"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod disposition;
mod error;
mod header;
mod message;

pub mod encoding;

pub use content_type::ContentType;
pub use disposition::{ContentDisposition, DispositionType};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::{Leaves, Message, Part, TransferEncoding};

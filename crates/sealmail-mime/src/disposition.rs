//! `Content-Disposition` handling (RFC 2183).

use crate::content_type::split_parameters;
use crate::encoding::decode_rfc2047;
use std::collections::HashMap;

/// Disposition type of a MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionType {
    /// Displayed automatically as part of the message.
    Inline,
    /// Offered to the user as a separate file.
    Attachment,
    /// Any other token, kept lowercased.
    Other(String),
}

/// Parsed `Content-Disposition` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type.
    pub disposition: DispositionType,
    /// Parameters (e.g., filename, size).
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a `Content-Disposition` value. Never fails: an unknown or
    /// empty type becomes [`DispositionType::Other`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (head, parameters) = split_parameters(s);
        let disposition = match head.to_lowercase().as_str() {
            "inline" => DispositionType::Inline,
            "attachment" => DispositionType::Attachment,
            other => DispositionType::Other(other.to_string()),
        };
        Self {
            disposition,
            parameters,
        }
    }

    /// Returns true for `inline`.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        self.disposition == DispositionType::Inline
    }

    /// Returns true for `attachment`.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition == DispositionType::Attachment
    }

    /// Returns the decoded file name.
    ///
    /// Looks at `filename`, then at the RFC 2231 `filename*` form
    /// (`charset'lang'percent-encoded`).
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        if let Some(name) = self.parameters.get("filename") {
            return Some(decode_rfc2047(name).unwrap_or_else(|_| name.clone()));
        }
        self.parameters
            .get("filename*")
            .map(|value| decode_rfc2231(value))
    }
}

/// Decodes the extended parameter syntax `utf-8''na%C3%AFve.txt`.
fn decode_rfc2231(value: &str) -> String {
    let encoded = value.splitn(3, '\'').nth(2).unwrap_or(value);
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(hex) = encoded.get(i + 1..i + 3)
            && let Ok(byte) = u8::from_str_radix(hex, 16)
        {
            out.push(byte);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

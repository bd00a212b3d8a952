//! MIME entity structure and parsing.

use crate::content_type::ContentType;
use crate::disposition::ContentDisposition;
use crate::encoding::{decode_base64_lenient, decode_quoted_printable_bytes};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;

/// Maximum multipart nesting accepted by the parser.
const MAX_DEPTH: usize = 32;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// MIME part: headers, raw body, and child parts for `multipart/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, still transfer-encoded).
    pub body: Vec<u8>,
    /// Child parts, in document order (empty unless multipart).
    pub parts: Vec<Part>,
}

impl Part {
    /// Creates a new leaf part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self {
            headers,
            body,
            parts: Vec::new(),
        }
    }

    /// Parses a MIME entity, recursing into multipart bodies.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid headers or content type, on a multipart
    /// entity without boundary or delimiters, or on excessive nesting.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Self::parse_nested(raw, 0)
    }

    fn parse_nested(raw: &[u8], depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::InvalidMultipart("nesting too deep".to_string()));
        }

        let (head, body) = split_head_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head))?;
        let mut part = Self::new(headers, body.to_vec());

        let content_type = part.content_type()?;
        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            part.parts = split_multipart(body, boundary)?
                .into_iter()
                .map(|child| Self::parse_nested(child, depth + 1))
                .collect::<Result<_>>()?;
        }

        Ok(part)
    }

    /// Gets the content type (`text/plain` when absent).
    ///
    /// # Errors
    ///
    /// Returns an error if content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Checks if this part is a multipart container.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type().is_ok_and(|ct| ct.is_multipart())
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Gets the parsed `Content-Disposition`, if any.
    #[must_use]
    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Gets the file name from `Content-Disposition`, falling back to the
    /// `name` parameter of `Content-Type`.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        self.disposition()
            .and_then(|cd| cd.file_name())
            .or_else(|| {
                let ct = self.content_type().ok()?;
                ct.name().map(|name| {
                    crate::encoding::decode_rfc2047(name).unwrap_or_else(|_| name.to_string())
                })
            })
            .filter(|name| !name.trim().is_empty())
    }

    /// Gets the `Content-ID` without surrounding angle brackets.
    #[must_use]
    pub fn content_id(&self) -> Option<&str> {
        self.headers
            .get("content-id")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
            .filter(|id| !id.is_empty())
    }

    /// Returns true if the part is meant to be offered as a file rather
    /// than displayed as the message text.
    #[must_use]
    pub fn is_attachment_like(&self) -> bool {
        self.disposition().is_some_and(|cd| cd.is_attachment()) || self.file_name().is_some()
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => decode_base64_lenient(&self.body),
            TransferEncoding::QuotedPrintable => decode_quoted_printable_bytes(&self.body),
            _ => Ok(self.body.clone()),
        }
    }

    /// Gets the decoded body as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding or UTF-8 conversion fails.
    pub fn body_text(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        String::from_utf8(decoded).map_err(Into::into)
    }

    /// Gets the decoded body as a string, honouring Latin-1 charsets and
    /// replacing invalid UTF-8 sequences.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text_lossy(&self) -> Result<String> {
        let decoded = self.decode_body()?;
        let charset = self
            .content_type()
            .ok()
            .and_then(|ct| ct.charset().map(str::to_lowercase));
        match charset.as_deref() {
            Some("iso-8859-1" | "latin1" | "windows-1252") => {
                Ok(decoded.into_iter().map(char::from).collect())
            }
            _ => Ok(String::from_utf8_lossy(&decoded).into_owned()),
        }
    }

    /// Iterates over the leaf parts in document order.
    #[must_use]
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves { stack: vec![self] }
    }

    /// Returns the parts from `self` down to `descendant`, both included.
    ///
    /// Parts are matched by identity, so `descendant` must be borrowed from
    /// this tree.
    #[must_use]
    pub fn ancestry<'a>(&'a self, descendant: &Self) -> Option<Vec<&'a Self>> {
        if std::ptr::eq(self, descendant) {
            return Some(vec![self]);
        }
        self.parts.iter().find_map(|child| {
            let mut chain = child.ancestry(descendant)?;
            chain.insert(0, self);
            Some(chain)
        })
    }
}

/// Depth-first iterator over the non-multipart parts of an entity.
#[derive(Debug)]
pub struct Leaves<'a> {
    stack: Vec<&'a Part>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a Part;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(part) = self.stack.pop() {
            if part.parts.is_empty() {
                if !part.is_multipart() {
                    return Some(part);
                }
            } else {
                self.stack.extend(part.parts.iter().rev());
            }
        }
        None
    }
}

/// MIME message: the root entity of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    root: Part,
}

impl Message {
    /// Parses a complete MIME message.
    ///
    /// # Errors
    ///
    /// See [`Part::parse`].
    pub fn parse(raw: &[u8]) -> Result<Self> {
        Part::parse(raw).map(|root| Self { root })
    }

    /// Gets the root part.
    #[must_use]
    pub const fn root(&self) -> &Part {
        &self.root
    }

    /// Gets the top-level headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.root.headers
    }

    /// Gets the top-level content type.
    ///
    /// # Errors
    ///
    /// Returns an error if content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.root.content_type()
    }

    /// Checks if this is a multipart message.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.root.is_multipart()
    }

    /// Iterates over the leaf parts in document order.
    #[must_use]
    pub fn leaves(&self) -> Leaves<'_> {
        self.root.leaves()
    }

    /// Finds the first `text/plain` part that is not an attachment.
    #[must_use]
    pub fn text_part(&self) -> Option<&Part> {
        self.find_text("plain")
    }

    /// Finds the first `text/html` part that is not an attachment.
    #[must_use]
    pub fn html_part(&self) -> Option<&Part> {
        self.find_text("html")
    }

    fn find_text(&self, sub_type: &str) -> Option<&Part> {
        self.leaves().find(|part| {
            !part.is_attachment_like()
                && part
                    .content_type()
                    .is_ok_and(|ct| ct.is("text", sub_type))
        })
    }
}

/// Splits an entity at the first empty line.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(rest) = raw.strip_prefix(b"\r\n") {
        return (&[], rest);
    }
    if let Some(rest) = raw.strip_prefix(b"\n") {
        return (&[], rest);
    }

    let crlf = find(raw, b"\r\n\r\n").map(|idx| (idx, idx + 4));
    let lf = find(raw, b"\n\n").map(|idx| (idx, idx + 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };

    match split {
        Some((head_end, body_start)) => (&raw[..head_end], &raw[body_start..]),
        None => (raw, &[]),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits a multipart body into its encapsulated parts (RFC 2046 5.1.1).
///
/// The line break before each delimiter belongs to the delimiter. The
/// preamble and epilogue are dropped; a missing close delimiter is
/// tolerated.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut found_delimiter = false;
    let mut line_start = 0;

    while line_start < body.len() {
        let line_end = body[line_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |idx| line_start + idx);
        let next_line = (line_end + 1).min(body.len());
        let line = &body[line_start..line_end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if let Some(closing) = delimiter_kind(line, boundary) {
            found_delimiter = true;
            if let Some(start) = part_start.take() {
                let mut end = line_start;
                if end > start && body[end - 1] == b'\n' {
                    end -= 1;
                    if end > start && body[end - 1] == b'\r' {
                        end -= 1;
                    }
                }
                if end > start {
                    parts.push(&body[start..end]);
                }
            }
            if closing {
                return Ok(parts);
            }
            part_start = Some(next_line);
        }

        line_start = next_line;
    }

    if !found_delimiter {
        return Err(Error::InvalidMultipart(format!(
            "no delimiter for boundary {boundary:?}"
        )));
    }
    if let Some(start) = part_start
        && start < body.len()
    {
        parts.push(&body[start..]);
    }
    Ok(parts)
}

/// Returns `Some(is_closing)` if the line is a delimiter for `boundary`.
fn delimiter_kind(line: &[u8], boundary: &str) -> Option<bool> {
    let rest = line.strip_prefix(b"--")?.strip_prefix(boundary.as_bytes())?;
    let (closing, rest) = rest
        .strip_prefix(b"--")
        .map_or((false, rest), |after| (true, after));
    rest.iter()
        .all(u8::is_ascii_whitespace)
        .then_some(closing)
}

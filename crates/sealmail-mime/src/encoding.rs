//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Base64 data, ignoring any whitespace (line breaks in MIME bodies).
///
/// # Errors
///
/// Returns an error if the remaining input is not valid Base64.
pub fn decode_base64_lenient(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable bytes (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match data.get(i + 1..i + 3) {
            Some(b"\r\n") => {
                i += 3;
                continue;
            }
            _ if data.get(i + 1) == Some(&b'\n') => {
                i += 2;
                continue;
            }
            _ => {}
        }

        let hex = data
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|_| Error::InvalidEncoding("Invalid hex".to_string()))?;
        let value = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(value);
        i += 3;
    }

    Ok(result)
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences or the
/// decoded bytes are not UTF-8.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let decoded = decode_quoted_printable_bytes(text.as_bytes())?;
    String::from_utf8(decoded).map_err(Into::into)
}

/// Decodes RFC 2047 encoded words inside a header value.
///
/// Format of a word: `=?charset?encoding?encoded-text?=`. Text outside
/// encoded words is kept, whitespace between two adjacent encoded words
/// is dropped. UTF-8 and US-ASCII are decoded as such, any other charset
/// is treated as ISO-8859-1.
///
/// # Errors
///
/// Returns an error if an encoded word is malformed.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    let mut previous_was_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        let Some((word, consumed)) = split_encoded_word(candidate) else {
            output.push_str(before);
            output.push_str("=?");
            rest = &candidate[2..];
            previous_was_word = false;
            continue;
        };

        if !(previous_was_word && before.trim().is_empty()) {
            output.push_str(before);
        }
        output.push_str(&decode_word(word)?);
        rest = &candidate[consumed..];
        previous_was_word = true;
    }

    output.push_str(rest);
    Ok(output)
}

/// Splits `=?a?b?c?=...` into the inner `a?b?c` and the consumed length.
fn split_encoded_word(candidate: &str) -> Option<(&str, usize)> {
    let inner = &candidate[2..];
    let charset_end = inner.find('?')?;
    let encoding_end = charset_end + 1 + inner[charset_end + 1..].find('?')?;
    let text_end = encoding_end + 1 + inner[encoding_end + 1..].find("?=")?;
    Some((&inner[..text_end], text_end + 4))
}

fn decode_word(word: &str) -> Result<String> {
    let parts: Vec<&str> = word.splitn(3, '?').collect();
    let [charset, encoding, encoded_text] = parts.as_slice() else {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    };

    let bytes = match encoding.to_uppercase().as_str() {
        "B" => decode_base64(encoded_text)?,
        // Quoted-Printable with underscore for space
        "Q" => decode_quoted_printable_bytes(encoded_text.replace('_', " ").as_bytes())?,
        other => {
            return Err(Error::InvalidEncoding(format!(
                "Unknown encoding: {other}"
            )));
        }
    };

    let charset = charset.to_lowercase();
    if charset == "utf-8" || charset == "us-ascii" {
        String::from_utf8(bytes).map_err(Into::into)
    } else {
        Ok(bytes.into_iter().map(char::from).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
        assert!(decode_base64("SGVsbG8s\r\n").is_err());
    }

    #[test]
    fn test_base64_lenient() {
        let decoded = decode_base64_lenient(b"SGVsbG8s\r\nIFdvcmxk\r\nIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable("Hello, World!").unwrap();
        assert_eq!(decoded, "Hello, World!");

        let decoded = decode_quoted_printable("H=C3=A9llo").unwrap();
        assert_eq!(decoded, "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(
            decode_quoted_printable("Hello=\r\nWorld").unwrap(),
            "HelloWorld"
        );
        assert_eq!(decode_quoted_printable("Hello=\nWorld").unwrap(), "HelloWorld");
    }

    #[test]
    fn test_quoted_printable_binary() {
        let decoded = decode_quoted_printable_bytes(b"=FF=00a").unwrap();
        assert_eq!(decoded, vec![0xFF, 0x00, b'a']);
    }

    #[test]
    fn test_quoted_printable_incomplete() {
        assert!(decode_quoted_printable("abc=4").is_err());
        assert!(decode_quoted_printable("abc=ZZ").is_err());
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
    }

    #[test]
    fn test_rfc2047_quoted_printable() {
        let decoded = decode_rfc2047("=?utf-8?Q?H=C3=A9llo_there?=").unwrap();
        assert_eq!(decoded, "Héllo there");
    }

    #[test]
    fn test_rfc2047_mixed_words() {
        let decoded = decode_rfc2047("report =?utf-8?B?SMOp?= =?utf-8?B?bGxv?=.pdf").unwrap();
        assert_eq!(decoded, "report Héllo.pdf");
    }

    #[test]
    fn test_rfc2047_latin1() {
        let decoded = decode_rfc2047("=?iso-8859-1?Q?caf=E9?=").unwrap();
        assert_eq!(decoded, "café");
    }

    #[test]
    fn test_rfc2047_unterminated_is_literal() {
        assert_eq!(decode_rfc2047("a =? b").unwrap(), "a =? b");
    }
}

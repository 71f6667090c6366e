//! Transfer and header decoding: Base64, Quoted-Printable, RFC 2047.
//!
//! Decode-only. The pipeline never generates mail, so the encoding half of
//! RFC 2045/2047 is deliberately absent.

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

/// Decodes Base64 data leniently, ignoring embedded whitespace.
///
/// Message bodies wrap Base64 at 76 columns, so line breaks are stripped
/// before decoding.
///
/// # Errors
///
/// Returns an error if the remaining input is not valid Base64.
pub fn decode_base64_lenient(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    decode_base64(&cleaned)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// # Errors
///
/// Returns an error if the input contains an invalid escape sequence.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '=' {
            // Soft line break
            if chars.peek() == Some(&'\r') {
                chars.next();
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    continue;
                }
            } else if chars.peek() == Some(&'\n') {
                chars.next();
                continue;
            }

            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
                result.push(byte);
            } else {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        } else {
            result.push(ch as u8);
        }
    }

    Ok(result)
}

/// Decodes a single RFC 2047 encoded word.
///
/// Format: `=?charset?encoding?encoded-text?=`
fn decode_encoded_word(word: &str) -> Result<String> {
    let inner = word
        .strip_prefix("=?")
        .and_then(|w| w.strip_suffix("?="))
        .ok_or_else(|| Error::InvalidEncoding("Not an encoded word".to_string()))?;

    let parts: Vec<&str> = inner.splitn(3, '?').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidEncoding(
            "Invalid RFC 2047 format".to_string(),
        ));
    }

    let encoding = parts[1].to_uppercase();
    let encoded_text = parts[2];

    let bytes = match encoding.as_str() {
        "B" => decode_base64(encoded_text)?,
        "Q" => {
            // Q encoding uses underscore for space
            let text_with_spaces = encoded_text.replace('_', " ");
            decode_quoted_printable(&text_with_spaces)?
        }
        _ => {
            return Err(Error::InvalidEncoding(format!(
                "Unknown encoding: {encoding}"
            )));
        }
    };

    String::from_utf8(bytes).map_err(Into::into)
}

/// Decodes a header value that may contain RFC 2047 encoded words mixed with
/// plain text.
///
/// Whitespace between two adjacent encoded words is dropped per RFC 2047
/// §6.2; whitespace next to plain text is preserved.
///
/// # Errors
///
/// Returns an error if an encoded word is malformed or not valid UTF-8.
pub fn decode_header_value(value: &str) -> Result<String> {
    let mut result = String::new();
    let mut rest = value;
    let mut last_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let Some(end_rel) = rest[start + 2..].find("?=") else {
            break;
        };
        let end = start + 2 + end_rel + 2;

        let (before, word) = (&rest[..start], &rest[start..end]);
        let decoded = decode_encoded_word(word)?;

        // Whitespace between two adjacent encoded words is transparent
        if !(last_was_encoded && before.chars().all(char::is_whitespace)) {
            result.push_str(before);
        }
        result.push_str(&decoded);
        last_was_encoded = true;
        rest = &rest[end..];
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        assert_eq!(decode_base64("SGVsbG8=").unwrap(), b"Hello");
        assert!(decode_base64("not base64!!!").is_err());
    }

    #[test]
    fn test_base64_lenient_strips_line_breaks() {
        let wrapped = "SGVs\r\nbG8s\r\nIFdvcmxkIQ==";
        assert_eq!(decode_base64_lenient(wrapped).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable("H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_break() {
        let decoded = decode_quoted_printable("Hello=\r\n World").unwrap();
        assert_eq!(decoded, b"Hello World");
    }

    #[test]
    fn test_quoted_printable_incomplete_escape() {
        assert!(decode_quoted_printable("Hello=4").is_err());
    }

    #[test]
    fn test_decode_header_plain() {
        assert_eq!(decode_header_value("Invoice 42").unwrap(), "Invoice 42");
    }

    #[test]
    fn test_decode_header_b_encoded() {
        let value = "=?utf-8?B?RmFrdMO6cmEgMTIzNA==?=";
        assert_eq!(decode_header_value(value).unwrap(), "Faktúra 1234");
    }

    #[test]
    fn test_decode_header_q_encoded() {
        let value = "=?utf-8?Q?Invoice_for_=C3=81pril?=";
        assert_eq!(decode_header_value(value).unwrap(), "Invoice for Ápril");
    }

    #[test]
    fn test_decode_header_adjacent_words() {
        let value = "=?utf-8?B?SGVs?= =?utf-8?B?bG8=?=";
        assert_eq!(decode_header_value(value).unwrap(), "Hello");
    }

    #[test]
    fn test_decode_header_mixed() {
        let value = "Re: =?utf-8?B?RmFrdMO6cmE=?= 99";
        assert_eq!(decode_header_value(value).unwrap(), "Re: Faktúra 99");
    }

    #[test]
    fn test_decode_header_invalid_word_fails() {
        // Encoded marker present but the payload is not valid Base64
        assert!(decode_header_value("=?utf-8?B?###?=").is_err());
    }
}

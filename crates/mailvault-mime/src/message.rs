//! MIME message structure and raw-bytes parsing.

use chrono::{DateTime, FixedOffset};

use crate::content_type::{ContentDisposition, ContentType, DispositionKind};
use crate::encoding::{decode_base64_lenient, decode_quoted_printable};
use crate::error::{Error, Result};
use crate::header::Headers;

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

/// Decodes raw body bytes according to a transfer encoding.
fn decode_with(encoding: TransferEncoding, body: &[u8]) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::Base64 => decode_base64_lenient(&String::from_utf8_lossy(body)),
        TransferEncoding::QuotedPrintable => {
            decode_quoted_printable(&String::from_utf8_lossy(body))
        }
        _ => Ok(body.to_vec()),
    }
}

/// MIME message part.
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, still transfer-encoded).
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, defaulting to text/plain.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Gets the content disposition if the header is present.
    #[must_use]
    pub fn disposition(&self) -> Option<ContentDisposition> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
    }

    /// Checks whether this part is an attachment.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition()
            .is_some_and(|d| d.kind == DispositionKind::Attachment)
    }

    /// Gets the attachment filename, decoding RFC 2047 words when present.
    ///
    /// Falls back to the raw parameter value if decoding fails.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let disposition = self.disposition()?;
        let raw = disposition.filename()?;
        Some(crate::encoding::decode_header_value(raw).unwrap_or_else(|_| raw.to_string()))
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails.
    pub fn decode_body(&self) -> Result<Vec<u8>> {
        decode_with(self.transfer_encoding(), &self.body)
    }

    /// Gets the decoded body as text, replacing invalid UTF-8 sequences.
    ///
    /// # Errors
    ///
    /// Returns an error if transfer decoding fails.
    pub fn body_text(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.decode_body()?).into_owned())
    }
}

/// Parsed MIME message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Leaf parts for multipart messages (nested multiparts are flattened).
    pub parts: Vec<Part>,
    /// Body for single-part messages.
    pub body: Option<Vec<u8>>,
}

impl Message {
    /// Parses a message from raw RFC 822 bytes.
    ///
    /// Multipart bodies are split on their boundary; nested multipart
    /// containers are flattened so `parts` holds only leaf parts.
    ///
    /// # Errors
    ///
    /// Returns an error if a multipart content type lacks a boundary.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (head, body) = split_head_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(head));

        let content_type = headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)?;

        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            let mut parts = Vec::new();
            collect_leaf_parts(body, boundary, &mut parts)?;
            Ok(Self {
                headers,
                parts,
                body: None,
            })
        } else {
            Ok(Self {
                headers,
                parts: Vec::new(),
                body: Some(body.to_vec()),
            })
        }
    }

    /// Checks if this is a multipart message.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        self.body.is_none()
    }

    /// Gets the From header.
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.headers.get("from")
    }

    /// Gets the raw Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Gets the Date header parsed as an RFC 2822 timestamp.
    #[must_use]
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.headers.get("date").and_then(parse_date)
    }

    /// Gets an arbitrary header parsed as an RFC 2822 timestamp.
    #[must_use]
    pub fn date_header(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        self.headers.get(name).and_then(parse_date)
    }

    /// Extracts the plain-text body.
    ///
    /// For multipart messages this is the first text/plain part not marked
    /// as an attachment; for single-part messages the whole payload.
    /// Returns an empty string if no such part exists.
    #[must_use]
    pub fn plain_body(&self) -> String {
        if let Some(body) = &self.body {
            let encoding = self
                .headers
                .get("content-transfer-encoding")
                .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
            return decode_with(encoding, body)
                .map(|b| String::from_utf8_lossy(&b).into_owned())
                .unwrap_or_default();
        }

        for part in &self.parts {
            let is_plain = part.content_type().is_ok_and(|ct| ct.is_text_plain());
            if is_plain && !part.is_attachment() {
                return part.body_text().unwrap_or_default();
            }
        }
        String::new()
    }

    /// Iterates over attachment parts.
    pub fn attachments(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_attachment())
    }
}

/// Parses an RFC 2822 date string, tolerating a missing weekday.
#[must_use]
pub fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(s.trim()).ok()
}

/// Splits raw message bytes into the header block and the body.
fn split_head_body(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        (&raw[..pos], &raw[pos + 4..])
    } else if let Some(pos) = find(raw, b"\n\n") {
        (&raw[..pos], &raw[pos + 2..])
    } else {
        (raw, &[])
    }
}

/// Finds the first occurrence of `needle` in `haystack`.
fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Splits a multipart body on its boundary and appends leaf parts,
/// recursing into nested multipart containers.
fn collect_leaf_parts(body: &[u8], boundary: &str, out: &mut Vec<Part>) -> Result<()> {
    let delimiter = format!("--{boundary}");
    let terminator = format!("--{boundary}--");

    let mut segments: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<Vec<u8>> = None;

    for line in body.split(|&b| b == b'\n') {
        let trimmed = trim_cr(line);
        if trimmed == terminator.as_bytes() {
            if let Some(segment) = current.take() {
                segments.push(segment);
            }
            break;
        }
        if trimmed == delimiter.as_bytes() {
            if let Some(segment) = current.take() {
                segments.push(segment);
            }
            current = Some(Vec::new());
            continue;
        }
        if let Some(segment) = &mut current {
            segment.extend_from_slice(line);
            segment.push(b'\n');
        }
    }
    if let Some(segment) = current.take() {
        segments.push(segment);
    }

    for segment in segments {
        let (head, part_body) = split_head_body(&segment);
        let headers = Headers::parse(&String::from_utf8_lossy(head));
        let part = Part::new(headers, trim_trailing_newline(part_body).to_vec());

        let content_type = part.content_type()?;
        if content_type.is_multipart() {
            let nested = content_type
                .boundary()
                .ok_or(Error::MissingBoundary)?
                .to_string();
            collect_leaf_parts(&part.body, &nested, out)?;
        } else {
            out.push(part);
        }
    }

    Ok(())
}

/// Strips a trailing `\r` left over from `\r\n` line splitting.
fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Strips the final line break a boundary split leaves on a part body.
fn trim_trailing_newline(body: &[u8]) -> &[u8] {
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    body.strip_suffix(b"\r").unwrap_or(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn multipart_fixture() -> Vec<u8> {
        concat!(
            "From: sender@x.com\r\n",
            "Subject: Invoice\r\n",
            "Date: Sun, 03 Nov 2024 10:15:00 +0100\r\n",
            "Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n",
            "\r\n",
            "--XYZ\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Please find the invoice attached.\r\n",
            "--XYZ\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0xLjQ=\r\n",
            "--XYZ--\r\n",
        )
        .as_bytes()
        .to_vec()
    }

    #[test]
    fn test_parse_single_part() {
        let raw = b"From: a@b.c\r\nSubject: Hi\r\n\r\nHello there.\r\n";
        let msg = Message::parse(raw).unwrap();
        assert!(!msg.is_multipart());
        assert_eq!(msg.from(), Some("a@b.c"));
        assert_eq!(msg.plain_body().trim(), "Hello there.");
    }

    #[test]
    fn test_parse_multipart() {
        let msg = Message::parse(&multipart_fixture()).unwrap();
        assert!(msg.is_multipart());
        assert_eq!(msg.parts.len(), 2);
        assert_eq!(msg.plain_body().trim(), "Please find the invoice attached.");
    }

    #[test]
    fn test_attachment_detection_and_decode() {
        let msg = Message::parse(&multipart_fixture()).unwrap();
        let attachments: Vec<_> = msg.attachments().collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename(), Some("invoice.pdf".to_string()));
        assert_eq!(attachments[0].decode_body().unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn test_date_parsing() {
        let msg = Message::parse(&multipart_fixture()).unwrap();
        let date = msg.date().unwrap();
        assert_eq!(date.timezone().local_minus_utc(), 3600);
        assert_eq!(date.to_rfc2822(), "Sun, 3 Nov 2024 10:15:00 +0100");
    }

    #[test]
    fn test_nested_multipart_is_flattened() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=OUTER\r\n",
            "\r\n",
            "--OUTER\r\n",
            "Content-Type: multipart/alternative; boundary=INNER\r\n",
            "\r\n",
            "--INNER\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain body\r\n",
            "--INNER\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>html body</p>\r\n",
            "--INNER--\r\n",
            "--OUTER--\r\n",
        );
        let msg = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(msg.parts.len(), 2);
        assert_eq!(msg.plain_body().trim(), "plain body");
    }

    #[test]
    fn test_multipart_without_boundary_fails() {
        let raw = b"Content-Type: multipart/mixed\r\n\r\nbody";
        assert!(Message::parse(raw).is_err());
    }

    #[test]
    fn test_missing_date_is_none() {
        let msg = Message::parse(b"Subject: x\r\n\r\nbody").unwrap();
        assert!(msg.date().is_none());
        assert!(msg.date_header("delivery-date").is_none());
    }
}

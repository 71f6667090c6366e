//! Content-Type and Content-Disposition header handling.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Parses the `; key=value` parameter tail shared by Content-Type and
/// Content-Disposition.
fn parse_parameters<'a>(parts: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    for param in parts {
        if let Some((key, value)) = param.trim().split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            parameters.insert(key, value);
        }
    }
    parameters
}

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "application", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "pdf", "mixed").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates a text/plain content type, the default when no header is present.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters.get("boundary").map(String::as_str)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is text/plain.
    #[must_use]
    pub fn is_text_plain(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text") && self.sub_type.eq_ignore_ascii_case("plain")
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2=value2`
    ///
    /// # Errors
    ///
    /// Returns an error if the `type/subtype` part is missing.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');

        let type_str = parts
            .next()
            .ok_or_else(|| Error::InvalidContentType("Empty content type".to_string()))?
            .trim();

        let (main_type, sub_type) = type_str
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype in '{type_str}'")))?;

        let mut content_type = Self::new(
            main_type.trim().to_lowercase(),
            sub_type.trim().to_lowercase(),
        );
        content_type.parameters = parse_parameters(parts);
        Ok(content_type)
    }
}

/// How a part asks to be presented (RFC 2183).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispositionKind {
    /// Displayed inline with the message body.
    #[default]
    Inline,
    /// A separate file attached to the message.
    Attachment,
    /// Any other disposition token.
    Other,
}

/// Parsed Content-Disposition header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition kind.
    pub kind: DispositionKind,
    /// Parameters (e.g., filename=invoice.pdf).
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }

    /// Parses a content disposition string.
    ///
    /// Format: `disposition; param1=value1`
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let mut parts = s.split(';');
        let kind = match parts.next().map(str::trim) {
            Some(token) if token.eq_ignore_ascii_case("attachment") => DispositionKind::Attachment,
            Some(token) if token.eq_ignore_ascii_case("inline") || token.is_empty() => {
                DispositionKind::Inline
            }
            Some(_) => DispositionKind::Other,
            None => DispositionKind::Inline,
        };

        Self {
            kind,
            parameters: parse_parameters(parts),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("text/plain; charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
        assert!(ct.is_text_plain());
    }

    #[test]
    fn test_content_type_parse_quoted_boundary() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_123"));
    }

    #[test]
    fn test_content_type_missing_subtype() {
        assert!(ContentType::parse("text").is_err());
    }

    #[test]
    fn test_disposition_attachment_filename() {
        let cd = ContentDisposition::parse("attachment; filename=\"invoice.pdf\"");
        assert_eq!(cd.kind, DispositionKind::Attachment);
        assert_eq!(cd.filename(), Some("invoice.pdf"));
    }

    #[test]
    fn test_disposition_inline() {
        let cd = ContentDisposition::parse("inline");
        assert_eq!(cd.kind, DispositionKind::Inline);
        assert_eq!(cd.filename(), None);
    }

    #[test]
    fn test_disposition_case_insensitive() {
        let cd = ContentDisposition::parse("ATTACHMENT; FILENAME=a.pdf");
        assert_eq!(cd.kind, DispositionKind::Attachment);
        assert_eq!(cd.filename(), Some("a.pdf"));
    }
}

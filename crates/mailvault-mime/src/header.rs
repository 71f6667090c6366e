//! MIME header block parsing.

use crate::encoding::decode_header_value;
use crate::error::Result;
use std::collections::HashMap;

/// Collection of email headers, case-insensitive by name.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gets the first value for a header with RFC 2047 encoded words decoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the value carries a malformed encoded word.
    pub fn get_decoded(&self, name: &str) -> Result<Option<String>> {
        self.get(name).map(decode_header_value).transpose()
    }

    /// Parses a header block from raw text.
    ///
    /// Continuation lines (starting with space or tab) are folded into the
    /// preceding header. Parsing stops at the first empty line.
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current_name: Option<String> = None;
        let mut current_value = String::new();

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                }
            } else {
                if let Some(name) = current_name.take() {
                    headers.add(name, current_value.trim());
                    current_value.clear();
                }
                if let Some((name, value)) = line.split_once(':') {
                    current_name = Some(name.trim().to_string());
                    current_value = value.trim().to_string();
                }
                // Lines without a colon are malformed; dropped silently
            }
        }

        if let Some(name) = current_name {
            headers.add(name, current_value.trim());
        }

        headers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let text = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test Message\r\n",
            "\r\n",
            "body not parsed here\r\n",
        );
        let headers = Headers::parse(text);
        assert_eq!(headers.get("from"), Some("sender@example.com"));
        assert_eq!(headers.get("SUBJECT"), Some("Test Message"));
        assert_eq!(headers.get("body"), None);
    }

    #[test]
    fn test_parse_continuation_line() {
        let text = "Content-Type: multipart/mixed;\r\n boundary=abc\r\n\r\n";
        let headers = Headers::parse(text);
        assert_eq!(
            headers.get("content-type"),
            Some("multipart/mixed; boundary=abc")
        );
    }

    #[test]
    fn test_parse_repeated_header() {
        let text = "Received: from a\r\nReceived: from b\r\n\r\n";
        let headers = Headers::parse(text);
        assert_eq!(headers.get("received"), Some("from a"));
        assert_eq!(headers.get_all("received").len(), 2);
    }

    #[test]
    fn test_get_decoded() {
        let mut headers = Headers::new();
        headers.add("Subject", "=?utf-8?B?RmFrdMO6cmE=?=");
        assert_eq!(
            headers.get_decoded("subject").unwrap(),
            Some("Faktúra".to_string())
        );
    }
}

//! MIME header handling.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Collection of header fields, keyed by lower-cased name.
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
        let value = value.into();
        self.headers.entry(name).or_default().push(value);
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Parses a raw header block.
    ///
    /// Lines end in CRLF or bare LF. Folded lines (starting with a space or
    /// tab) are unfolded into the previous field. Parsing stops at the first
    /// empty line. Bytes that are not UTF-8 are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] for a line that is neither a field nor
    /// a continuation.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in raw.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8_lossy(line);

            if line.starts_with([' ', '\t']) {
                let Some((_, value)) = current.as_mut() else {
                    return Err(Error::InvalidHeader(format!(
                        "Continuation line before any field: {line:?}"
                    )));
                };
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::InvalidHeader(format!("Malformed header line: {line:?}")));
            };
            let name = name.trim_end();
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(Error::InvalidHeader(format!("Malformed header name: {name:?}")));
            }

            if let Some((name, value)) = current.take() {
                headers.add(name, value.trim().to_string());
            }
            current = Some((name.to_string(), value.trim().to_string()));
        }

        if let Some((name, value)) = current {
            headers.add(name, value.trim().to_string());
        }

        Ok(headers)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_add_get() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "application/pdf");
        assert_eq!(headers.get("Content-Type"), Some("application/pdf"));
        assert_eq!(headers.get("content-type"), Some("application/pdf")); // Case insensitive
    }

    #[test]
    fn test_headers_parse() {
        let raw = concat!(
            "From: sender@example.com\r\n",
            "To: recipient@example.com\r\n",
            "Subject: Test Message\r\n",
            "Content-Type: multipart/mixed;\r\n",
            "\tboundary=\"b1\"\r\n",
            "\r\n",
            "Not-A-Header: body text\r\n"
        );

        let headers = Headers::parse(raw.as_bytes()).unwrap();
        assert_eq!(headers.get("From"), Some("sender@example.com"));
        assert_eq!(headers.get("Subject"), Some("Test Message"));
        assert_eq!(
            headers.get("Content-Type"),
            Some("multipart/mixed; boundary=\"b1\"")
        );
        assert_eq!(headers.get("Not-A-Header"), None);
        assert_eq!(headers.get("To"), Some("recipient@example.com"));
    }

    #[test]
    fn test_headers_parse_bare_lf_and_repeats() {
        let raw = b"Received: a\nReceived: b\nX-Empty:\n";
        let headers = Headers::parse(raw).unwrap();
        // The first occurrence wins
        assert_eq!(headers.get("received"), Some("a"));
        assert_eq!(headers.get("x-empty"), Some(""));
    }

    #[test]
    fn test_headers_parse_eight_bit() {
        let raw = "Subject: תלוש משכורת\r\n".as_bytes();
        let headers = Headers::parse(raw).unwrap();
        assert_eq!(headers.get("subject"), Some("תלוש משכורת"));
    }

    #[test]
    fn test_headers_parse_malformed() {
        assert!(matches!(
            Headers::parse(b"no colon here\r\n"),
            Err(Error::InvalidHeader(_))
        ));
        assert!(matches!(
            Headers::parse(b" leading continuation\r\n"),
            Err(Error::InvalidHeader(_))
        ));
    }
}

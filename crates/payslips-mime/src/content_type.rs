//! MIME content type and content disposition handling.

use crate::error::{Error, Result};
use crate::params::{parse_parameters, split_value};
use std::collections::HashMap;
use std::fmt;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type, lower-cased (e.g., "text", "application", "multipart").
    pub main_type: String,
    /// Subtype, lower-cased (e.g., "plain", "pdf", "mixed").
    pub sub_type: String,
    /// Parameters keyed by lower-cased name (e.g., charset, boundary, name).
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

    /// The RFC 2045 default for parts without a Content-Type header.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "us-ascii")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns `type/subtype` without parameters.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters
            .get("boundary")
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    /// Returns the (discouraged) name parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameters.get("name").map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type == "text"
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContentType`] if the media type is malformed and
    /// [`Error::UnknownCharset`] if an RFC 2231 parameter names an unsupported
    /// charset.
    pub fn parse(s: &str) -> Result<Self> {
        let (media_type, params) = split_value(s);

        let (main_type, sub_type) = media_type
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype in {s:?}")))?;
        let main_type = main_type.trim();
        let sub_type = sub_type.trim();
        if !is_token(main_type) || !is_token(sub_type) {
            return Err(Error::InvalidContentType(format!(
                "Malformed media type {media_type:?}"
            )));
        }

        Ok(Self {
            main_type: main_type.to_ascii_lowercase(),
            sub_type: sub_type.to_ascii_lowercase(),
            parameters: parse_parameters(params)?,
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        let mut parameters: Vec<_> = self.parameters.iter().collect();
        parameters.sort();
        for (key, value) in parameters {
            if is_token(value) {
                write!(f, "; {key}={value}")?;
            } else {
                write!(f, "; {key}=\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
        }

        Ok(())
    }
}

/// Disposition type from a Content-Disposition header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionKind {
    /// `inline`: meant to be displayed with the message.
    Inline,
    /// `attachment`: meant to be saved separately.
    Attachment,
    /// Any other disposition type, lower-cased.
    Other(String),
}

/// MIME content disposition with parameters (RFC 2183).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type.
    pub kind: DispositionKind,
    /// Parameters keyed by lower-cased name (e.g., filename, size).
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a content disposition string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the disposition type is malformed
    /// and [`Error::UnknownCharset`] if an RFC 2231 parameter names an
    /// unsupported charset.
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, params) = split_value(s);
        if !is_token(kind) {
            return Err(Error::InvalidHeader(format!(
                "Malformed Content-Disposition {s:?}"
            )));
        }

        let kind = match kind.to_ascii_lowercase().as_str() {
            "inline" => DispositionKind::Inline,
            "attachment" => DispositionKind::Attachment,
            other => DispositionKind::Other(other.to_string()),
        };

        Ok(Self {
            kind,
            parameters: parse_parameters(params)?,
        })
    }

    /// Returns true for `attachment`.
    #[must_use]
    pub const fn is_attachment(&self) -> bool {
        matches!(self.kind, DispositionKind::Attachment)
    }

    /// Returns true for `inline`.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        matches!(self.kind, DispositionKind::Inline)
    }

    /// Returns the filename parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }
}

/// RFC 2045 token: non-empty, printable ASCII, no spaces or tspecials.
fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
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
    fn test_content_type_new() {
        let ct = ContentType::new("application", "pdf");
        assert_eq!(ct.mime_type(), "application/pdf");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_text_plain_default() {
        let ct = ContentType::text_plain();
        assert!(ct.is_text());
        assert_eq!(ct.charset(), Some("us-ascii"));
    }

    #[test]
    fn test_content_type_parse() {
        let ct = ContentType::parse("text/plain; charset=utf-8").unwrap();
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert_eq!(ct.charset(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_parse_lowercases() {
        let ct = ContentType::parse("Application/PDF; Name=\"123456789_2024_01.pdf\"").unwrap();
        assert_eq!(ct.mime_type(), "application/pdf");
        assert_eq!(ct.name(), Some("123456789_2024_01.pdf"));
    }

    #[test]
    fn test_content_type_parse_quoted_boundary() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"----=_Part_123; x\"").unwrap();
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("----=_Part_123; x"));
    }

    #[test]
    fn test_content_type_empty_boundary() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"\"").unwrap();
        assert_eq!(ct.boundary(), None);
    }

    #[test]
    fn test_content_type_parse_invalid() {
        assert!(matches!(
            ContentType::parse("pdf"),
            Err(Error::InvalidContentType(_))
        ));
        assert!(matches!(
            ContentType::parse("application/"),
            Err(Error::InvalidContentType(_))
        ));
        assert!(matches!(
            ContentType::parse("app lication/pdf"),
            Err(Error::InvalidContentType(_))
        ));
    }

    #[test]
    fn test_content_type_display() {
        let ct = ContentType::new("application", "pdf").with_parameter("name", "a b.pdf");
        assert_eq!(ct.to_string(), "application/pdf; name=\"a b.pdf\"");
    }

    #[test]
    fn test_disposition_attachment() {
        let cd = ContentDisposition::parse("Attachment; filename=\"123456789_2024_01.pdf\"")
            .unwrap();
        assert!(cd.is_attachment());
        assert!(!cd.is_inline());
        assert_eq!(cd.filename(), Some("123456789_2024_01.pdf"));
    }

    #[test]
    fn test_disposition_inline_and_other() {
        assert!(ContentDisposition::parse("inline").unwrap().is_inline());
        let cd = ContentDisposition::parse("form-data; name=x").unwrap();
        assert_eq!(cd.kind, DispositionKind::Other("form-data".to_string()));
    }

    #[test]
    fn test_disposition_rfc2231_filename() {
        let cd = ContentDisposition::parse("attachment; filename*=utf-8''%D7%AA.pdf").unwrap();
        assert_eq!(cd.filename(), Some("ת.pdf"));
    }

    #[test]
    fn test_disposition_invalid() {
        assert!(matches!(
            ContentDisposition::parse(""),
            Err(Error::InvalidHeader(_))
        ));
    }
}

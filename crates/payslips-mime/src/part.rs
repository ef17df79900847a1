//! MIME entity structure: headers, body and transfer encoding.

use crate::content_type::{ContentDisposition, ContentType};
use crate::encoding::{decode_base64, decode_quoted_printable, decode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
    /// Anything else (`x-uuencode`, typos, ...). Cannot be decoded.
    Unknown,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::Unknown,
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
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One MIME entity borrowed from a raw message: parsed headers plus the
/// still-encoded body.
#[derive(Debug, Clone)]
pub struct Part<'a> {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, transfer-encoded bytes).
    pub body: &'a [u8],
}

impl<'a> Part<'a> {
    /// Splits a raw entity at the first empty line and parses its headers.
    ///
    /// An entity that starts with an empty line has no headers; one without
    /// any empty line has no body.
    ///
    /// # Errors
    ///
    /// Returns an error if the header block is malformed.
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        let (header, body) = split_header_body(raw);
        Ok(Self {
            headers: Headers::parse(header)?,
            body,
        })
    }

    /// Gets the content type, `text/plain` when the header is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the content type header is invalid.
    pub fn content_type(&self) -> Result<ContentType> {
        self.headers
            .get("content-type")
            .map_or_else(|| Ok(ContentType::text_plain()), ContentType::parse)
    }

    /// Gets the content disposition, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the content disposition header is invalid.
    pub fn content_disposition(&self) -> Result<Option<ContentDisposition>> {
        self.headers
            .get("content-disposition")
            .map(ContentDisposition::parse)
            .transpose()
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Returns the decoded filename.
    ///
    /// Taken from the Content-Disposition `filename` parameter, falling back
    /// to the Content-Type `name` parameter. RFC 2047 words are decoded.
    ///
    /// # Errors
    ///
    /// Returns an error if either header is invalid or the filename uses an
    /// unknown charset.
    pub fn filename(&self) -> Result<Option<String>> {
        let disposition = self.content_disposition()?;
        let raw = match disposition.as_ref().and_then(ContentDisposition::filename) {
            Some(name) => Some(name.to_string()),
            None => self.content_type()?.name().map(str::to_string),
        };
        raw.map(|name| decode_rfc2047(&name)).transpose()
    }

    /// Wraps the body together with its transfer encoding.
    #[must_use]
    pub fn into_body(self) -> PartBody<'a> {
        let encoding = self.transfer_encoding();
        PartBody::new(self.body, encoding)
    }
}

/// A transfer-encoded body. [`PartBody::decode`] consumes it.
///
/// ```compile_fail
/// use payslips_mime::{PartBody, TransferEncoding};
///
/// let body = PartBody::new(b"%PDF", TransferEncoding::Binary);
/// let first = body.decode();
/// let second = body.decode();
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct PartBody<'a> {
    raw: &'a [u8],
    encoding: TransferEncoding,
}

impl<'a> PartBody<'a> {
    /// Creates a body from raw bytes and their transfer encoding.
    #[must_use]
    pub const fn new(raw: &'a [u8], encoding: TransferEncoding) -> Self {
        Self { raw, encoding }
    }

    /// Returns the transfer encoding.
    #[must_use]
    pub const fn encoding(&self) -> TransferEncoding {
        self.encoding
    }

    /// Decodes the body according to its transfer encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid in its encoding, or the
    /// encoding is unknown.
    pub fn decode(self) -> Result<Vec<u8>> {
        match self.encoding {
            TransferEncoding::Base64 => decode_base64(self.raw),
            TransferEncoding::QuotedPrintable => decode_quoted_printable(self.raw),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Ok(self.raw.to_vec())
            }
            TransferEncoding::Unknown => Err(Error::InvalidEncoding(
                "Unsupported Content-Transfer-Encoding".to_string(),
            )),
        }
    }
}

/// Splits at the first empty line. The empty line itself belongs to neither.
fn split_header_body(raw: &[u8]) -> (&[u8], &[u8]) {
    let mut pos = 0;
    while pos < raw.len() {
        let line_end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(raw.len(), |i| pos + i + 1);
        let line = &raw[pos..line_end];
        if line == b"\n" || line == b"\r\n" {
            return (&raw[..pos], &raw[line_end..]);
        }
        pos = line_end;
    }
    (raw, &[])
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
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse(" quoted-printable "),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::Unknown);
    }

    #[test]
    fn test_split_header_body() {
        assert_eq!(
            split_header_body(b"A: 1\r\n\r\nbody\r\n"),
            (&b"A: 1\r\n"[..], &b"body\r\n"[..])
        );
        assert_eq!(split_header_body(b"\r\nbody"), (&b""[..], &b"body"[..]));
        assert_eq!(split_header_body(b"A: 1\nB: 2\n\nx"), (&b"A: 1\nB: 2\n"[..], &b"x"[..]));
        assert_eq!(split_header_body(b"A: 1\r\n"), (&b"A: 1\r\n"[..], &b""[..]));
    }

    #[test]
    fn test_part_defaults() {
        let part = Part::parse(b"\r\nhello").unwrap();
        assert!(part.content_type().unwrap().is_text());
        assert_eq!(part.transfer_encoding(), TransferEncoding::SevenBit);
        assert!(part.content_disposition().unwrap().is_none());
        assert_eq!(part.filename().unwrap(), None);
        assert_eq!(part.into_body().decode().unwrap(), b"hello");
    }

    #[test]
    fn test_part_filename_from_disposition() {
        let raw = concat!(
            "Content-Type: application/pdf; name=\"other.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"123456789_2024_01.pdf\"\r\n",
            "\r\n"
        );
        let part = Part::parse(raw.as_bytes()).unwrap();
        assert_eq!(
            part.filename().unwrap().as_deref(),
            Some("123456789_2024_01.pdf")
        );
    }

    #[test]
    fn test_part_filename_falls_back_to_name() {
        let raw = "Content-Type: application/pdf; name=\"=?utf-8?B?16rXnNeV16k=?=.pdf\"\r\n\r\n";
        let part = Part::parse(raw.as_bytes()).unwrap();
        assert_eq!(part.filename().unwrap().as_deref(), Some("תלוש.pdf"));
    }

    #[test]
    fn test_part_filename_unknown_charset() {
        let raw = "Content-Disposition: attachment; filename=\"=?x-klingon?Q?a?=\"\r\n\r\n";
        let part = Part::parse(raw.as_bytes()).unwrap();
        assert!(part.filename().unwrap_err().is_charset());
    }

    #[test]
    fn test_body_decode_base64() {
        let raw = concat!(
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0x\r\n",
            "LjQK\r\n"
        );
        let body = Part::parse(raw.as_bytes()).unwrap().into_body();
        assert_eq!(body.encoding(), TransferEncoding::Base64);
        assert_eq!(body.decode().unwrap(), b"%PDF-1.4\n");
    }

    #[test]
    fn test_body_decode_quoted_printable() {
        let body = PartBody::new(b"caf=C3=A9=\r\n!", TransferEncoding::QuotedPrintable);
        assert_eq!(body.decode().unwrap(), "café!".as_bytes());
    }

    #[test]
    fn test_body_decode_unknown() {
        let body = PartBody::new(b"begin 644 x", TransferEncoding::Unknown);
        assert!(matches!(body.decode(), Err(Error::InvalidEncoding(_))));
    }
}

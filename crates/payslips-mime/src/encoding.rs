//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, RFC 2047 encoded words and RFC 2231
//! extended parameter values. Charsets are resolved with `encoding_rs`.

use std::borrow::Cow;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use encoding_rs::Encoding;

use crate::error::{Error, Result};

/// Standard alphabet, padding optional. Mailers disagree on trailing `=`.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decodes Base64 data, ignoring line breaks and other whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(cleaned).map_err(Into::into)
}

/// Decodes Quoted-Printable data (RFC 2045).
///
/// Soft line breaks (`=` at the end of a line, optionally followed by
/// transport padding) are removed. Hard line breaks are kept as they are.
///
/// # Errors
///
/// Returns an error if the input contains an invalid escape sequence.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut pos = 0;

    while let Some(&byte) = data.get(pos) {
        if byte != b'=' {
            result.push(byte);
            pos += 1;
            continue;
        }

        let rest = &data[pos + 1..];
        let padding = rest
            .iter()
            .take_while(|b| matches!(b, b' ' | b'\t'))
            .count();
        let after_padding = &rest[padding..];
        if after_padding.is_empty() {
            break;
        }
        if after_padding.starts_with(b"\r\n") {
            pos += 1 + padding + 2;
            continue;
        }
        if after_padding.starts_with(b"\n") {
            pos += 1 + padding + 1;
            continue;
        }

        match (
            rest.first().copied().and_then(hex_value),
            rest.get(1).copied().and_then(hex_value),
        ) {
            (Some(high), Some(low)) => {
                result.push((high << 4) | low);
                pos += 3;
            }
            _ => {
                return Err(Error::InvalidEncoding(format!(
                    "Invalid quoted-printable escape at byte {pos}"
                )));
            }
        }
    }

    Ok(result)
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Looks up a charset label (`UTF-8`, `iso-8859-8`, `windows-1255`, ...).
///
/// # Errors
///
/// Returns [`Error::UnknownCharset`] if the label names no supported charset.
pub fn lookup_charset(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label_no_replacement(label.trim().as_bytes())
        .ok_or_else(|| Error::UnknownCharset(label.to_string()))
}

/// Decodes bytes in the named charset to a string.
///
/// Malformed sequences become U+FFFD; a leading BOM is dropped.
///
/// # Errors
///
/// Returns [`Error::UnknownCharset`] if the label names no supported charset.
pub fn decode_charset(label: &str, data: &[u8]) -> Result<String> {
    let encoding = lookup_charset(label)?;
    Ok(encoding.decode_with_bom_removal(data).0.into_owned())
}

/// Decodes every RFC 2047 encoded word in a header value.
///
/// Whitespace between two adjacent encoded words is dropped; all other text
/// is kept verbatim. Words that look encoded but do not decode are left
/// untouched.
///
/// # Errors
///
/// Returns [`Error::UnknownCharset`] if an encoded word names an unsupported
/// charset.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    if !text.contains("=?") {
        return Ok(text.to_string());
    }

    let mut result = String::with_capacity(text.len());
    let mut previous_encoded = false;
    let mut rest = text;

    while !rest.is_empty() {
        let word_start = rest.len() - rest.trim_start().len();
        let (whitespace, tail) = rest.split_at(word_start);
        let word_end = tail.find(char::is_whitespace).unwrap_or(tail.len());
        let (word, tail) = tail.split_at(word_end);
        rest = tail;

        if word.is_empty() {
            result.push_str(whitespace);
            break;
        }

        if let Some(decoded) = decode_encoded_word(word)? {
            if !previous_encoded {
                result.push_str(whitespace);
            }
            result.push_str(&decoded);
            previous_encoded = true;
        } else {
            result.push_str(whitespace);
            result.push_str(word);
            previous_encoded = false;
        }
    }

    Ok(result)
}

/// Decodes one `=?charset?encoding?text?=` word.
///
/// Returns `Ok(None)` when `word` is not a well-formed encoded word.
fn decode_encoded_word(word: &str) -> Result<Option<String>> {
    let Some(inner) = word
        .strip_prefix("=?")
        .and_then(|w| w.strip_suffix("?="))
    else {
        return Ok(None);
    };

    let mut fields = inner.splitn(3, '?');
    let (Some(charset), Some(transfer), Some(content)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Ok(None);
    };
    if content.contains('?') || !content.is_ascii() {
        return Ok(None);
    }

    // RFC 2231 allows a language suffix: `=?utf-8*he?...`
    let charset = charset.split('*').next().unwrap_or(charset);

    // `_` stands for a space before transfer decoding, whatever the charset
    let content: Cow<'_, [u8]> = if content.contains('_') {
        Cow::Owned(
            content
                .bytes()
                .map(|b| if b == b'_' { b' ' } else { b })
                .collect(),
        )
    } else {
        Cow::Borrowed(content.as_bytes())
    };

    let bytes = match transfer {
        "b" | "B" => decode_base64(&content).ok(),
        "q" | "Q" => decode_quoted_printable(&content).ok(),
        _ => None,
    };
    let Some(bytes) = bytes else {
        return Ok(None);
    };

    decode_charset(charset, &bytes).map(Some)
}

/// Percent-decodes an RFC 2231 extended value. Invalid escapes are kept.
pub(crate) fn percent_decode(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while let Some(&byte) = bytes.get(pos) {
        if byte == b'%'
            && let (Some(high), Some(low)) = (
                bytes.get(pos + 1).copied().and_then(hex_value),
                bytes.get(pos + 2).copied().and_then(hex_value),
            )
        {
            result.push((high << 4) | low);
            pos += 3;
            continue;
        }
        result.push(byte);
        pos += 1;
    }

    result
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
    use base64::engine::general_purpose::STANDARD;
    use proptest::prelude::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64(b"SGVsbG8sIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_wrapped_lines() {
        let decoded = decode_base64(b"SGVsbG8s\r\nIFdvcmxk\r\nIQ==\r\n").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_missing_padding() {
        let decoded = decode_base64(b"SGVsbG8sIFdvcmxkIQ").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_base64_decode_invalid() {
        let err = decode_base64(b"SGVs*bG8=").unwrap_err();
        assert!(matches!(err, Error::Base64Decode(_)));
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"Hello, World!").unwrap(), b"Hello, World!");
        assert_eq!(
            decode_quoted_printable(b"H=C3=A9llo").unwrap(),
            "Héllo".as_bytes()
        );
        assert_eq!(decode_quoted_printable(b"a=3db").unwrap(), b"a=b");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        assert_eq!(
            decode_quoted_printable(b"Hello=\r\nWorld").unwrap(),
            b"HelloWorld"
        );
        assert_eq!(decode_quoted_printable(b"Hello=\nWorld").unwrap(), b"HelloWorld");
        assert_eq!(
            decode_quoted_printable(b"Hello= \t\r\nWorld").unwrap(),
            b"HelloWorld"
        );
    }

    #[test]
    fn test_quoted_printable_keeps_hard_breaks() {
        assert_eq!(decode_quoted_printable(b"a\r\nb").unwrap(), b"a\r\nb");
    }

    #[test]
    fn test_quoted_printable_invalid_escape() {
        let err = decode_quoted_printable(b"bad=ZZ").unwrap_err();
        assert!(matches!(err, Error::InvalidEncoding(_)));
        assert!(decode_quoted_printable(b"short=A").is_err());
    }

    #[test]
    fn test_lookup_charset() {
        assert_eq!(lookup_charset("UTF-8").unwrap(), encoding_rs::UTF_8);
        assert_eq!(lookup_charset(" windows-1255 ").unwrap(), encoding_rs::WINDOWS_1255);
        assert!(lookup_charset("x-unknown").unwrap_err().is_charset());
    }

    #[test]
    fn test_decode_charset_hebrew() {
        // "שלום" in ISO-8859-8
        let decoded = decode_charset("iso-8859-8", &[0xF9, 0xEC, 0xE5, 0xED]).unwrap();
        assert_eq!(decoded, "שלום");
    }

    #[test]
    fn test_rfc2047_plain_text() {
        assert_eq!(decode_rfc2047("Hello").unwrap(), "Hello");
        assert_eq!(decode_rfc2047("a  b ").unwrap(), "a  b ");
    }

    #[test]
    fn test_rfc2047_decode() {
        assert_eq!(decode_rfc2047("=?utf-8?B?SMOpbGxv?=").unwrap(), "Héllo");
        assert_eq!(decode_rfc2047("=?utf-8?Q?H=C3=A9llo?=").unwrap(), "Héllo");
        assert_eq!(
            decode_rfc2047("=?US-ASCII?Q?Keith_Moore?=").unwrap(),
            "Keith Moore"
        );
        assert_eq!(
            decode_rfc2047("=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=").unwrap(),
            "Keld Jørn Simonsen"
        );
        assert_eq!(
            decode_rfc2047("=?iso-8859-8?b?7eXs+SDv4SDp7Oj08A==?=").unwrap(),
            "םולש ןב ילטפנ"
        );
    }

    #[test]
    fn test_rfc2047_adjacent_words() {
        assert_eq!(
            decode_rfc2047("=?utf-8?Q?123456789=5F?= \r\n =?utf-8?Q?2024=5F01.pdf?=").unwrap(),
            "123456789_2024_01.pdf"
        );
        assert_eq!(
            decode_rfc2047("Re: =?utf-8?B?SMOpbGxv?= there").unwrap(),
            "Re: Héllo there"
        );
    }

    #[test]
    fn test_rfc2047_language_suffix() {
        assert_eq!(decode_rfc2047("=?utf-8*en?Q?a_b?=").unwrap(), "a b");
    }

    #[test]
    fn test_rfc2047_malformed_left_alone() {
        assert_eq!(decode_rfc2047("=?utf-8?X?abc?=").unwrap(), "=?utf-8?X?abc?=");
        assert_eq!(decode_rfc2047("=?utf-8?B?").unwrap(), "=?utf-8?B?");
    }

    #[test]
    fn test_rfc2047_unknown_charset() {
        let err = decode_rfc2047("=?x-klingon?Q?abc?=").unwrap_err();
        assert!(err.is_charset());
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("%D7%AA.pdf"), "ת.pdf".as_bytes());
        assert_eq!(percent_decode("100%"), b"100%");
        assert_eq!(percent_decode("%zz"), b"%zz");
    }

    proptest! {
        #[test]
        fn decode_base64_ignores_line_wrapping(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let encoded = STANDARD.encode(&data);
            let wrapped = encoded
                .as_bytes()
                .chunks(76)
                .collect::<Vec<_>>()
                .join(&b"\r\n"[..]);
            prop_assert_eq!(decode_base64(&wrapped).unwrap(), data);
        }

        #[test]
        fn decode_quoted_printable_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_quoted_printable(&data);
        }

        #[test]
        fn decode_quoted_printable_passes_plain_text(s in "[a-zA-Z0-9 .,_-]{0,128}") {
            prop_assert_eq!(decode_quoted_printable(s.as_bytes()).unwrap(), s.as_bytes());
        }

        #[test]
        fn decode_rfc2047_never_panics(s in r"=\?.*\?.*\?.*\?=") {
            let _ = decode_rfc2047(&s);
        }
    }
}

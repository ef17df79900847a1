//! Depth-first walk over the attachments of a raw message.

use crate::content_type::ContentType;
use crate::encoding::lookup_charset;
use crate::error::{Error, Result};
use crate::part::{Part, PartBody};

/// Maximum nesting of multipart containers.
const MAX_DEPTH: usize = 64;

/// An attachment found in a message.
#[derive(Debug)]
pub struct Attachment<'a> {
    /// Decoded filename, if the part carries one.
    pub filename: Option<String>,
    /// Content type of the part.
    pub content_type: ContentType,
    /// Transfer-encoded body.
    pub body: PartBody<'a>,
}

/// Lazy iterator over the attachment parts of a message, in document order.
///
/// A part is an attachment when its disposition is `attachment`, or when it
/// has no `inline` disposition and is neither `text/*` nor `multipart/*`.
///
/// Items are `Err` in two cases:
/// - a charset problem in one part ([`Error::is_charset`]); iteration can go
///   on with the next part
/// - anything else (bad multipart framing, bad headers); the iterator is
///   finished afterwards
#[derive(Debug)]
pub struct Attachments<'a> {
    root: Option<&'a [u8]>,
    stack: Vec<Multipart<'a>>,
    failed: bool,
}

impl<'a> Attachments<'a> {
    /// Starts a walk over a complete raw message (headers and body).
    #[must_use]
    pub const fn new(message: &'a [u8]) -> Self {
        Self {
            root: Some(message),
            stack: Vec::new(),
            failed: false,
        }
    }

    fn fail(&mut self, error: Error) -> Result<Attachment<'a>> {
        self.failed = true;
        self.stack.clear();
        Err(error)
    }

    /// Classifies one entity: descend, surface or skip.
    fn visit(&mut self, raw: &'a [u8]) -> Result<Option<Attachment<'a>>> {
        let part = Part::parse(raw)?;
        let content_type = part.content_type()?;

        if content_type.is_multipart() {
            let boundary = content_type.boundary().ok_or(Error::MissingBoundary)?;
            if self.stack.len() >= MAX_DEPTH {
                return Err(Error::InvalidMultipart(format!(
                    "More than {MAX_DEPTH} nested multiparts"
                )));
            }
            self.stack.push(Multipart::new(boundary, part.body));
            return Ok(None);
        }

        if content_type.is_text()
            && let Some(charset) = content_type.charset()
        {
            lookup_charset(charset)?;
        }

        let is_attachment = match part.content_disposition()? {
            Some(disposition) if disposition.is_attachment() => true,
            Some(disposition) if disposition.is_inline() => false,
            _ => !content_type.is_text(),
        };
        if !is_attachment {
            return Ok(None);
        }

        let filename = part.filename()?;
        Ok(Some(Attachment {
            filename,
            content_type,
            body: part.into_body(),
        }))
    }
}

impl<'a> Iterator for Attachments<'a> {
    type Item = Result<Attachment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            let raw = if let Some(root) = self.root.take() {
                root
            } else {
                let multipart = self.stack.last_mut()?;
                match multipart.next_part() {
                    Ok(Some(raw)) => raw,
                    Ok(None) => {
                        self.stack.pop();
                        continue;
                    }
                    Err(e) => return Some(self.fail(e)),
                }
            };

            match self.visit(raw) {
                Ok(Some(attachment)) => return Some(Ok(attachment)),
                Ok(None) => {}
                Err(e) if e.is_charset() => return Some(Err(e)),
                Err(e) => return Some(self.fail(e)),
            }
        }
    }
}

impl std::iter::FusedIterator for Attachments<'_> {}

/// Cursor over the body parts of one multipart entity.
#[derive(Debug)]
struct Multipart<'a> {
    /// `--` followed by the boundary.
    delimiter: Vec<u8>,
    rest: &'a [u8],
    started: bool,
    done: bool,
}

impl<'a> Multipart<'a> {
    fn new(boundary: &str, body: &'a [u8]) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self {
            delimiter,
            rest: body,
            started: false,
            done: false,
        }
    }

    /// Returns the next body part, `None` after the close delimiter.
    fn next_part(&mut self) -> Result<Option<&'a [u8]>> {
        if self.done {
            return Ok(None);
        }

        if !self.started {
            let Some(first) = find_delimiter(self.rest, &self.delimiter) else {
                return Err(Error::InvalidMultipart(
                    "Boundary delimiter not found".to_string(),
                ));
            };
            self.started = true;
            if first.is_close {
                self.done = true;
                return Ok(None);
            }
            self.rest = &self.rest[first.next..];
        }

        let Some(delimiter) = find_delimiter(self.rest, &self.delimiter) else {
            return Err(Error::InvalidMultipart(
                "Missing closing boundary delimiter".to_string(),
            ));
        };
        let part = &self.rest[..delimiter.content_end];
        if delimiter.is_close {
            self.done = true;
            self.rest = &[];
        } else {
            self.rest = &self.rest[delimiter.next..];
        }
        Ok(Some(part))
    }
}

/// A delimiter line found in a multipart body.
#[derive(Debug, PartialEq, Eq)]
struct Delimiter {
    /// End of the preceding content; the line break before the delimiter is
    /// part of the delimiter.
    content_end: usize,
    /// Start of the line after the delimiter.
    next: usize,
    /// `--boundary--`.
    is_close: bool,
}

/// Finds the next line that starts with `delimiter` and carries nothing but
/// `--` and transport padding after it.
fn find_delimiter(data: &[u8], delimiter: &[u8]) -> Option<Delimiter> {
    let mut from = 0;

    loop {
        let at = from
            + data
                .get(from..)?
                .windows(delimiter.len())
                .position(|window| window == delimiter)?;
        from = at + 1;

        if at != 0 && data[at - 1] != b'\n' {
            continue;
        }

        let after = at + delimiter.len();
        let is_close = data[after..].starts_with(b"--");
        let tail_start = if is_close { after + 2 } else { after };
        let line_end = data[tail_start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(data.len(), |i| tail_start + i);
        let padding = &data[tail_start..line_end];
        let padding = padding.strip_suffix(b"\r").unwrap_or(padding);
        if !padding.iter().all(|&b| b == b' ' || b == b'\t') {
            continue;
        }

        let content_end = if at >= 2 && &data[at - 2..at] == b"\r\n" {
            at - 2
        } else if at >= 1 {
            at - 1
        } else {
            at
        };

        return Some(Delimiter {
            content_end,
            next: (line_end + 1).min(data.len()),
            is_close,
        });
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
    use proptest::prelude::*;

    fn filenames(message: &[u8]) -> Vec<Option<String>> {
        Attachments::new(message)
            .map(|a| a.unwrap().filename)
            .collect()
    }

    #[test]
    fn test_find_delimiter() {
        let data = b"preamble\r\n--b\r\nA: 1\r\n\r\nx\r\n--b--\r\n";
        let first = find_delimiter(data, b"--b").unwrap();
        assert_eq!(first.content_end, 8);
        assert_eq!(first.next, 15);
        assert!(!first.is_close);

        let rest = &data[first.next..];
        let close = find_delimiter(rest, b"--b").unwrap();
        assert!(close.is_close);
        assert_eq!(&rest[..close.content_end], b"A: 1\r\n\r\nx");
    }

    #[test]
    fn test_find_delimiter_ignores_prefix_matches() {
        // `--bb` and a delimiter in the middle of a line are not delimiters
        let data = b"x --b\r\n--bb\r\n--b  \r\ny";
        let found = find_delimiter(data, b"--b").unwrap();
        assert_eq!(found.content_end, 11);
        assert_eq!(&data[found.next..], b"y");
    }

    #[test]
    fn test_single_part_message() {
        let message = concat!(
            "Subject: payslip\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "Content-Disposition: attachment; filename=123456789_2024_01.pdf\r\n",
            "\r\n",
            "JVBERi0xLjQK\r\n"
        );
        let mut attachments: Vec<_> = Attachments::new(message.as_bytes())
            .map(Result::unwrap)
            .collect();
        assert_eq!(attachments.len(), 1);
        let attachment = attachments.remove(0);
        assert_eq!(attachment.content_type.mime_type(), "application/pdf");
        assert_eq!(attachment.body.decode().unwrap(), b"%PDF-1.4\n");
    }

    #[test]
    fn test_plain_text_message_has_no_attachments() {
        assert!(filenames(b"Subject: hi\r\n\r\nhello\r\n").is_empty());
    }

    #[test]
    fn test_nested_multipart_in_document_order() {
        let message = concat!(
            "Content-Type: multipart/mixed; boundary=outer\r\n",
            "\r\n",
            "This is a multi-part message.\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "תלוש משכורת\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>hi</p>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: application/pdf; name=\"a.pdf\"\r\n",
            "\r\n",
            "A\r\n",
            "--outer\r\n",
            "Content-Type: image/png\r\n",
            "Content-Disposition: inline; filename=logo.png\r\n",
            "\r\n",
            "PNG\r\n",
            "--outer\r\n",
            "Content-Type: text/csv\r\n",
            "Content-Disposition: attachment; filename=b.csv\r\n",
            "\r\n",
            "1,2\r\n",
            "--outer\r\n",
            "Content-Type: application/octet-stream\r\n",
            "\r\n",
            "C\r\n",
            "--outer--\r\n",
            "epilogue\r\n"
        );
        assert_eq!(
            filenames(message.as_bytes()),
            vec![Some("a.pdf".to_string()), Some("b.csv".to_string()), None]
        );
    }

    #[test]
    fn test_body_excludes_delimiter_line_break() {
        let message = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: application/pdf\r\n",
            "\r\n",
            "line1\r\n",
            "line2\r\n",
            "--b--"
        );
        let attachment = Attachments::new(message.as_bytes())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(attachment.body.decode().unwrap(), b"line1\r\nline2");
    }

    #[test]
    fn test_unknown_charset_skips_only_that_part() {
        let message = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain; charset=x-klingon\r\n",
            "\r\n",
            "nuqneH\r\n",
            "--b\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=\"=?x-klingon?Q?a?=\"\r\n",
            "\r\n",
            "A\r\n",
            "--b\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=good.pdf\r\n",
            "\r\n",
            "B\r\n",
            "--b--\r\n"
        );
        let items: Vec<_> = Attachments::new(message.as_bytes()).collect();
        assert_eq!(items.len(), 3);
        assert!(items[0].as_ref().unwrap_err().is_charset());
        assert!(items[1].as_ref().unwrap_err().is_charset());
        assert_eq!(
            items[2].as_ref().unwrap().filename.as_deref(),
            Some("good.pdf")
        );
    }

    #[test]
    fn test_missing_boundary_is_fatal() {
        let message = b"Content-Type: multipart/mixed\r\n\r\n--b\r\n\r\nx\r\n--b--\r\n";
        let items: Vec<_> = Attachments::new(message).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::MissingBoundary)));
    }

    #[test]
    fn test_missing_close_delimiter_is_fatal() {
        let message = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: application/pdf\r\n",
            "\r\n",
            "A\r\n",
            "--b\r\n",
            "Content-Type: application/pdf\r\n",
            "\r\n",
            "truncated"
        );
        let mut walker = Attachments::new(message.as_bytes());
        assert!(walker.next().unwrap().is_ok());
        assert!(matches!(
            walker.next(),
            Some(Err(Error::InvalidMultipart(_)))
        ));
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_bad_content_type_is_fatal() {
        let message = concat!(
            "Content-Type: multipart/mixed; boundary=b\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: garbage\r\n",
            "\r\n",
            "A\r\n",
            "--b\r\n",
            "Content-Type: application/pdf\r\n",
            "\r\n",
            "B\r\n",
            "--b--\r\n"
        );
        let items: Vec<_> = Attachments::new(message.as_bytes()).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::InvalidContentType(_))));
    }

    #[test]
    fn test_empty_multipart() {
        let message = b"Content-Type: multipart/mixed; boundary=b\r\n\r\n--b--\r\n";
        assert!(filenames(message).is_empty());
    }

    #[test]
    fn test_nesting_limit() {
        let mut message = "Content-Type: application/pdf\r\n\r\nA".to_string();
        for depth in 0..=MAX_DEPTH {
            message = format!(
                "Content-Type: multipart/mixed; boundary=b{depth}\r\n\r\n--b{depth}\r\n{message}\r\n--b{depth}--\r\n"
            );
        }
        let items: Vec<_> = Attachments::new(message.as_bytes()).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::InvalidMultipart(_))));
    }

    proptest! {
        #[test]
        fn walk_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = Attachments::new(&data).count();
        }

        #[test]
        fn walk_never_panics_inside_multipart(body in "[-a-z\r\n:;= ]{0,256}") {
            let message = format!("Content-Type: multipart/mixed; boundary=b\r\n\r\n{body}");
            let _ = Attachments::new(message.as_bytes()).count();
        }
    }
}

//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with support for literals. A response
//! is one line plus, for every line ending in `{n}`, the `n` literal bytes
//! and the line that follows them.

#![allow(clippy::missing_errors_doc)]

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for IMAP protocol.
pub struct FramedStream<S> {
    reader: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
        }
    }

    /// Reads one complete IMAP response, including embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(literal_len) = parse_literal_length(&line) else {
                break;
            };
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }

            let start = response.len();
            response.resize(start + literal_len, 0);
            self.reader.read_exact(&mut response[start..]).await?;
        }

        tracing::trace!(bytes = response.len(), "received response");
        Ok(response)
    }

    /// Reads a single CRLF-terminated line.
    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }

            // A CR at the end of one buffer and LF at the start of the next
            // is found on the next pass because the CR is already in `line`.
            if let Some(end) = find_line_end(&line, buf) {
                line.extend_from_slice(&buf[..end]);
                self.reader.consume(end);
                break;
            }

            let len = buf.len();
            line.extend_from_slice(buf);
            self.reader.consume(len);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }

        Ok(line)
    }

    /// Writes raw command bytes and flushes.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;

        Ok(())
    }
}

/// Returns how many bytes of `buf` complete the line, given what was read so far.
fn find_line_end(line: &[u8], buf: &[u8]) -> Option<usize> {
    if line.last() == Some(&b'\r') && buf.first() == Some(&b'\n') {
        return Some(1);
    }
    buf.windows(2).position(|w| w == b"\r\n").map(|pos| pos + 2)
}

/// Parses a literal length from the end of a line.
///
/// Matches patterns like `{123}\r\n` or `{123+}\r\n` (non-synchronizing).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);

    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Returns true if `response` is the tagged completion for `tag`.
pub(crate) fn is_tagged(response: &[u8], tag: &str) -> bool {
    response
        .strip_prefix(tag.as_bytes())
        .is_some_and(|rest| rest.first() == Some(&b' '))
}

/// A response reader that accumulates responses until a tagged response.
pub struct ResponseAccumulator {
    tag: String,
    responses: Vec<Vec<u8>>,
}

impl ResponseAccumulator {
    /// Creates a new response accumulator for the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            responses: Vec::new(),
        }
    }

    /// Reads responses until a tagged response matching our tag is found.
    pub async fn read_until_tagged<S>(
        &mut self,
        framed: &mut FramedStream<S>,
    ) -> Result<Vec<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let response = framed.read_response().await?;
            let done = is_tagged(&response, &self.tag);
            self.responses.push(response);

            if done {
                break;
            }
        }

        Ok(std::mem::take(&mut self.responses))
    }

    /// Reads and discards responses until the tagged response arrives.
    ///
    /// Used to skip the rest of an abandoned command.
    pub async fn drain_until_tagged<S>(&self, framed: &mut FramedStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut skipped = 0usize;
        loop {
            let response = framed.read_response().await?;
            if is_tagged(&response, &self.tag) {
                tracing::trace!(tag = %self.tag, skipped, "drained responses");
                return Ok(());
            }
            skipped += 1;
        }
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
    use tokio_test::io::Builder;

    use super::*;

    #[test]
    fn test_find_line_end() {
        assert_eq!(find_line_end(b"", b"hello\r\n"), Some(7));
        assert_eq!(find_line_end(b"", b"\r\n"), Some(2));
        assert_eq!(find_line_end(b"", b"no newline"), None);
        assert_eq!(find_line_end(b"", b"just\n"), None);
        assert_eq!(find_line_end(b"abc\r", b"\nrest"), Some(1));
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[test]
    fn test_is_tagged() {
        assert!(is_tagged(b"A0001 OK done\r\n", "A0001"));
        assert!(!is_tagged(b"A00010 OK done\r\n", "A0001"));
        assert!(!is_tagged(b"* OK done\r\n", "A0001"));
    }

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_split_crlf() {
        let mock = Builder::new().read(b"* OK ready\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_with_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {5}\r\n")
            .read(b"hel")
            .read(b"lo)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n");
    }

    #[tokio::test]
    async fn test_literal_containing_crlf() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {4}\r\na\r\nb UID 3)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {4}\r\na\r\nb UID 3)\r\n");
    }

    #[tokio::test]
    async fn test_framed_write_command() {
        let mock = Builder::new().write(b"A0001 LOGOUT\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_command(b"A0001 LOGOUT\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_response_accumulator() {
        let mock = Builder::new()
            .read(b"* CAPABILITY IMAP4rev1\r\n")
            .read(b"* OK IMAP ready\r\n")
            .read(b"A0001 OK Success\r\n")
            .build();

        let mut framed = FramedStream::new(mock);
        let mut accumulator = ResponseAccumulator::new("A0001");

        let responses = accumulator.read_until_tagged(&mut framed).await.unwrap();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[2], b"A0001 OK Success\r\n");
    }

    #[tokio::test]
    async fn test_drain_until_tagged() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {3}\r\nabc)\r\n")
            .read(b"A0004 OK FETCH done\r\n")
            .read(b"* BYE logging out\r\n")
            .read(b"A0005 OK LOGOUT done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        ResponseAccumulator::new("A0005")
            .drain_until_tagged(&mut framed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_eof_is_error() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let literal_size = MAX_LITERAL_SIZE + 1;
        let header = format!("* 1 FETCH (BODY[] {{{literal_size}}}\r\n");

        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_response().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }
}

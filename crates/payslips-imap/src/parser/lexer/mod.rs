//! IMAP lexer for tokenizing server responses.
//!
//! This module implements a lexer for the IMAP protocol grammar defined in RFC 9051.
//! It breaks raw bytes into tokens that the parser can process.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

use crate::{Error, Result};

/// One lexical unit of a server response.
///
/// Strings borrow from the input where they can: atoms point into it, while
/// quoted strings are unescaped into an owned copy. A literal carries the
/// `n` bytes that follow its `{n}` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Bare word such as `OK`, `FETCH` or a flag without backslash.
    Atom(&'a str),
    /// `"..."` with escapes resolved.
    QuotedString(String),
    /// Raw literal bytes.
    Literal(Vec<u8>),
    /// Unsigned 32-bit number.
    Number(u32),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// A single space.
    Space,
    /// `*`, opening untagged data.
    Asterisk,
    /// `+`, opening a continuation request.
    Plus,
    /// `NIL` in any case.
    Nil,
    /// Line end.
    Crlf,
    /// No input left.
    Eof,
}

/// IMAP lexer state.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the remaining input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true if at end of input.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Peeks at the byte at offset from current position.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Advances by one byte and returns it.
    pub fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips n bytes.
    pub fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("Expected LF after CR"))
                }
            }
            b' ' => {
                self.advance();
                Ok(Token::Space)
            }
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("Unexpected character: {byte:#04x}"))),
        }
    }

    /// Reads a quoted string token.
    ///
    /// Servers that accept UTF-8 send raw 8-bit text in quoted strings;
    /// invalid sequences are replaced rather than rejected.
    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance(); // Skip opening quote

        let mut result = Vec::new();

        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => {
                        return Err(self.error(&format!("Invalid escape: \\{}", c as char)));
                    }
                    None => return Err(self.error("Unexpected EOF in quoted string")),
                },
                Some(b'\r' | b'\n') => {
                    return Err(self.error("Line break in quoted string"));
                }
                Some(c) => result.push(c),
                None => return Err(self.error("Unexpected EOF in quoted string")),
            }
        }

        Ok(Token::QuotedString(
            String::from_utf8_lossy(&result).into_owned(),
        ))
    }

    /// Reads a literal: `{n}\r\n` (or `{n+}\r\n`) followed by n bytes.
    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.advance(); // Skip {

        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.input[start..self.pos];
        if self.peek() == Some(b'+') {
            self.advance();
        }

        let size: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("Invalid literal size"))?;

        if self.advance() != Some(b'}') {
            return Err(self.error("Expected } after literal size"));
        }
        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("Expected CRLF after literal size"));
        }

        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("Incomplete literal data"))?;

        let data = self.input[self.pos..end].to_vec();
        self.pos = end;

        Ok(Token::Literal(data))
    }

    /// Reads a number or atom starting with a digit.
    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let mut all_digits = true;

        while let Some(b) = self.peek() {
            if !is_atom_char(b) {
                break;
            }
            all_digits &= b.is_ascii_digit();
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if all_digits {
            let n: u32 = s.parse().map_err(|_| self.error("Number too large"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Reads an atom token.
    fn read_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;

        while self.peek().is_some_and(is_atom_char) {
            self.advance();
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("Invalid UTF-8 in atom"))?;

        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    /// Creates a parse error at the current position.
    fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Expects and consumes a specific token.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("Expected {expected:?}, got {token:?}")))
        }
    }

    /// Expects and consumes a space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads a nstring (NIL or string).
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s)),
            Token::Literal(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            token => Err(self.error(&format!("Expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u32> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("Expected number, got {token:?}"))),
        }
    }

    /// Reads an atom.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("Expected atom, got {token:?}"))),
        }
    }
}

/// Returns true if the byte is a valid atom character.
///
/// Note: This includes `\` to handle flags like `\Seen` as single tokens,
/// even though RFC 9051 technically defines `\` as a quoted-special.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 | 0x23..=0x24 | 0x26..=0x27 |  // ! # $ & '
        0x2B..=0x5A |                       // + , - . / 0-9 : ; < = > ? @ A-Z
        0x5C |                              // \ (for flags like \Seen)
        0x5E..=0x7A |                       // ^ _ ` a-z
        0x7C |                              // |
        0x7E                                // ~
    )
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
    fn test_tagged_response() {
        let mut lexer = Lexer::new(b"A001 OK LOGIN completed\r\n");

        assert_eq!(lexer.next_token().unwrap(), Token::Atom("A001"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("LOGIN"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("completed"));
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new(b"123 456");

        assert_eq!(lexer.next_token().unwrap(), Token::Number(123));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Number(456));
    }

    #[test]
    fn test_quoted_string_escaped() {
        let mut lexer = Lexer::new(b"\"hello \\\"world\\\"\"");

        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("hello \"world\"".to_string())
        );
    }

    #[test]
    fn test_quoted_string_utf8() {
        let mut lexer = Lexer::new("\"תלוש משכורת\"".as_bytes());

        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("תלוש משכורת".to_string())
        );
    }

    #[test]
    fn test_nil() {
        let mut lexer = Lexer::new(b"NIL nil");

        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn test_flag_list() {
        let mut lexer = Lexer::new(b"(\\Seen \\Flagged)");

        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Flagged"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn test_literal() {
        let mut lexer = Lexer::new(b"{5}\r\nhello)");

        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"hello".to_vec()));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn test_literal_binary_data() {
        let mut lexer = Lexer::new(b"{4}\r\n\xff\x00\r\n");

        assert_eq!(
            lexer.next_token().unwrap(),
            Token::Literal(vec![0xff, 0x00, b'\r', b'\n'])
        );
    }

    #[test]
    fn test_literal_truncated() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn test_nstring_literal_lossy() {
        let mut lexer = Lexer::new(b"{3}\r\na\xffb");
        assert_eq!(lexer.read_nstring().unwrap(), Some("a\u{fffd}b".to_string()));
    }

    #[test]
    fn test_is_atom_char() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b'0'));
        assert!(is_atom_char(b'\\'));
        assert!(is_atom_char(b'+'));
        assert!(!is_atom_char(b'"'));
        assert!(!is_atom_char(b'%'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'('));
        assert!(!is_atom_char(b'{'));
        assert!(!is_atom_char(b']'));
        assert!(!is_atom_char(0xC3));
    }
}

//! FETCH response parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::{Error, Result};

use super::parse_flag_list;
use super::types::{Address, Envelope, FetchItem};

/// Parses a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => {
                let upper = name.to_uppercase();
                match upper.as_str() {
                    "FLAGS" => {
                        lexer.expect_space()?;
                        let flags = parse_flag_list(lexer)?;
                        items.push(FetchItem::Flags(flags));
                    }
                    "UID" => {
                        lexer.expect_space()?;
                        let n = lexer.read_number()?;
                        let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                            position: lexer.position(),
                            message: format!("invalid UID value: {n} (UID cannot be 0)"),
                        })?;
                        items.push(FetchItem::Uid(uid));
                    }
                    "RFC822.SIZE" => {
                        lexer.expect_space()?;
                        let size = lexer.read_number()?;
                        items.push(FetchItem::Rfc822Size(size));
                    }
                    "ENVELOPE" => {
                        lexer.expect_space()?;
                        let envelope = parse_envelope(lexer)?;
                        items.push(FetchItem::Envelope(Box::new(envelope)));
                    }
                    // Non-extensible BODY is a structure, not a section
                    "BODY" if lexer.peek() == Some(b' ') && lexer.peek_at(1) == Some(b'(') => {
                        skip_fetch_item(lexer)?;
                    }
                    "BODY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                        let (section, origin) = parse_body_section_and_origin(lexer);

                        lexer.expect_space()?;
                        let data = match lexer.next_token()? {
                            Token::Literal(d) => Some(d),
                            Token::QuotedString(s) => Some(s.into_bytes()),
                            _ => None,
                        };

                        items.push(FetchItem::Body {
                            section,
                            origin,
                            data,
                        });
                    }
                    _ => skip_fetch_item(lexer)?,
                }
            }
            token @ (Token::Crlf | Token::Eof) => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unterminated FETCH data: {token:?}"),
                });
            }
            _ => continue,
        }
    }

    Ok(items)
}

/// Parses optional `[section]` and `<origin>` following a BODY item name.
fn parse_body_section_and_origin(lexer: &mut Lexer<'_>) -> (Option<String>, Option<u32>) {
    let section = read_delimited(lexer, b'[', b']').filter(|s| !s.is_empty());
    let origin = read_delimited(lexer, b'<', b'>').and_then(|s| s.parse().ok());
    (section, origin)
}

/// Reads raw text between `open` and `close` if the lexer is positioned on `open`.
fn read_delimited(lexer: &mut Lexer<'_>, open: u8, close: u8) -> Option<String> {
    if lexer.peek() != Some(open) {
        return None;
    }
    lexer.advance();

    let mut buf = String::new();
    while let Some(b) = lexer.advance() {
        if b == close {
            break;
        }
        buf.push(char::from(b));
    }
    Some(buf)
}

/// Parses an envelope structure.
pub fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect(Token::LParen)?;

    let date = lexer.read_nstring()?;
    lexer.expect_space()?;

    let subject = lexer.read_nstring()?;
    lexer.expect_space()?;

    let from = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let sender = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let reply_to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let to = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let cc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let bcc = parse_address_list(lexer)?;
    lexer.expect_space()?;

    let in_reply_to = lexer.read_nstring()?;
    lexer.expect_space()?;

    let message_id = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

/// Parses an address list.
pub fn parse_address_list(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();

            loop {
                match lexer.peek() {
                    Some(b')') => {
                        lexer.advance();
                        break;
                    }
                    Some(b'(') => {
                        addresses.push(parse_address(lexer)?);
                    }
                    Some(b' ') => {
                        lexer.advance();
                    }
                    _ => {
                        return Err(Error::Parse {
                            position: lexer.position(),
                            message: "Unterminated address list".to_string(),
                        });
                    }
                }
            }

            Ok(addresses)
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("Expected address list, got {token:?}"),
        }),
    }
}

/// Parses a single address.
pub fn parse_address(lexer: &mut Lexer<'_>) -> Result<Address> {
    lexer.expect(Token::LParen)?;

    let name = lexer.read_nstring()?;
    lexer.expect_space()?;

    let adl = lexer.read_nstring()?;
    lexer.expect_space()?;

    let mailbox = lexer.read_nstring()?;
    lexer.expect_space()?;

    let host = lexer.read_nstring()?;

    lexer.expect(Token::RParen)?;

    Ok(Address {
        name,
        adl,
        mailbox,
        host,
    })
}

/// Skips an unknown fetch item value.
///
/// The value is consumed token by token so quoted strings with spaces and
/// literals inside it are stepped over whole.
pub fn skip_fetch_item(lexer: &mut Lexer<'_>) -> Result<()> {
    // BINARY[1]<0> and friends
    let _ = parse_body_section_and_origin(lexer);
    lexer.expect_space()?;

    let mut depth = 0usize;
    loop {
        match lexer.next_token()? {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.checked_sub(1).ok_or_else(|| Error::Parse {
                    position: lexer.position(),
                    message: "Unbalanced parenthesis in FETCH item".to_string(),
                })?;
            }
            Token::Crlf | Token::Eof => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: "Unterminated FETCH item".to_string(),
                });
            }
            _ => {}
        }
        if depth == 0 {
            return Ok(());
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
    use super::*;

    #[test]
    fn test_parse_fetch_uid_valid() {
        let data = b"(UID 123 FLAGS (\\Seen))";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], FetchItem::Uid(_)));
    }

    #[test]
    fn test_parse_fetch_uid_zero_rejected() {
        let data = b"(UID 0)";
        let mut lexer = Lexer::new(data);
        let result = parse_fetch_response(&mut lexer);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("UID"));
    }

    #[test]
    fn test_parse_fetch_rfc822_size() {
        let data = b"(RFC822.SIZE 1234)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items, vec![FetchItem::Rfc822Size(1234)]);
    }

    #[test]
    fn test_parse_body_literal() {
        let data = b"(BODY[] {11}\r\nhello world UID 7)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 2);
        match &items[0] {
            FetchItem::Body {
                section,
                origin,
                data,
            } => {
                assert!(section.is_none());
                assert!(origin.is_none());
                assert_eq!(data.as_deref(), Some(&b"hello world"[..]));
            }
            other => panic!("Expected body, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_body_section_and_origin() {
        let data = b"[TEXT]<100>";
        let mut lexer = Lexer::new(data);
        let (section, origin) = parse_body_section_and_origin(&mut lexer);

        assert_eq!(section, Some("TEXT".to_string()));
        assert_eq!(origin, Some(100));
    }

    #[test]
    fn test_skip_unknown_items() {
        let data = b"(INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" MODSEQ (12345) X-GM-LABELS {5}\r\nlabel UID 9)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], FetchItem::Uid(uid) if uid.get() == 9));
    }

    #[test]
    fn test_skip_non_extensible_body() {
        let data = b"(BODY (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 12 1) UID 4)";
        let mut lexer = Lexer::new(data);
        let items = parse_fetch_response(&mut lexer).unwrap();

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], FetchItem::Uid(_)));
    }

    #[test]
    fn test_unterminated_fetch() {
        let mut lexer = Lexer::new(b"(UID 5\r\n");
        assert!(parse_fetch_response(&mut lexer).is_err());
    }

    #[test]
    fn test_parse_envelope() {
        let data = b"(\"Mon, 7 Feb 1994 21:52:25 -0800\" \"=?UTF-8?B?16rXnNeV16k=?=\" ((\"Payroll\" NIL \"payroll\" \"example.com\")) NIL NIL NIL NIL NIL NIL \"<id@example.com>\")";
        let mut lexer = Lexer::new(data);
        let envelope = parse_envelope(&mut lexer).unwrap();

        assert_eq!(
            envelope.subject,
            Some("=?UTF-8?B?16rXnNeV16k=?=".to_string())
        );
        assert_eq!(envelope.from.len(), 1);
        assert_eq!(envelope.from[0].mailbox.as_deref(), Some("payroll"));
        assert_eq!(envelope.from[0].host.as_deref(), Some("example.com"));
        assert_eq!(envelope.message_id, Some("<id@example.com>".to_string()));
    }
}

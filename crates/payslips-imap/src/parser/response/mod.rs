//! IMAP response parser.
//!
//! Parses server responses according to RFC 9051 grammar.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_continue)]

mod fetch;
mod helpers;
mod types;

pub use types::{Address, Envelope, FetchItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_capability_data, parse_response_code, parse_search_response, read_text_until_crlf,
};

/// A parsed IMAP response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Tagged response (command completion).
    Tagged {
        /// The command tag.
        tag: Tag,
        /// Response status.
        status: Status,
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Untagged response (server data).
    Untagged(UntaggedResponse),
    /// Continuation request.
    Continuation {
        /// Optional text/data.
        text: Option<String>,
    },
}

/// Response parser.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete response line.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Ok(Self::parse_continuation(&mut lexer)),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("Expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    /// Parses a tagged response.
    fn parse_tagged(lexer: &mut Lexer<'_>, tag_str: &str) -> Result<Response> {
        lexer.expect_space()?;

        let status = Self::parse_status(lexer)?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag_str),
            status,
            code,
            text,
        })
    }

    /// Parses an untagged response.
    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let token = lexer.next_token()?;

        let untagged = match token {
            Token::Atom(s) => {
                let upper = s.to_uppercase();
                match upper.as_str() {
                    "OK" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::Ok { code, text }
                    }
                    "NO" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::No { code, text }
                    }
                    "BAD" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::Bad { code, text }
                    }
                    "PREAUTH" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::PreAuth { code, text }
                    }
                    "BYE" => {
                        let (code, text) = Self::parse_resp_text(lexer)?;
                        UntaggedResponse::Bye { code, text }
                    }
                    "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
                    "FLAGS" => {
                        lexer.expect_space()?;
                        UntaggedResponse::Flags(parse_flag_list(lexer)?)
                    }
                    "SEARCH" => UntaggedResponse::Search(parse_search_response(lexer)?),
                    _ => {
                        // LIST, STATUS, ENABLED, ...: not used by this client
                        let rest = read_text_until_crlf(lexer);
                        UntaggedResponse::Other(format!("{s}{rest}"))
                    }
                }
            }
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                let upper = keyword.to_uppercase();

                match upper.as_str() {
                    "EXISTS" => UntaggedResponse::Exists(n),
                    "RECENT" => UntaggedResponse::Recent(n),
                    "EXPUNGE" => UntaggedResponse::Expunge(Self::seq_num(lexer, n)?),
                    "FETCH" => {
                        let seq = Self::seq_num(lexer, n)?;
                        lexer.expect_space()?;
                        let items = fetch::parse_fetch_response(lexer)?;
                        UntaggedResponse::Fetch { seq, items }
                    }
                    _ => {
                        let rest = read_text_until_crlf(lexer);
                        UntaggedResponse::Other(format!("{n} {keyword}{rest}"))
                    }
                }
            }
            _ => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in untagged response: {token:?}"),
                });
            }
        };

        Ok(Response::Untagged(untagged))
    }

    fn seq_num(lexer: &Lexer<'_>, n: u32) -> Result<SeqNum> {
        SeqNum::new(n).ok_or_else(|| Error::Parse {
            position: lexer.position(),
            message: "Invalid sequence number 0".to_string(),
        })
    }

    /// Parses a continuation response.
    fn parse_continuation(lexer: &mut Lexer<'_>) -> Response {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let text = read_text_until_crlf(lexer);

        Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        }
    }

    /// Parses a status keyword.
    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(Error::Parse {
                position: lexer.position(),
                message: format!("Invalid status: {s}"),
            }),
        }
    }

    /// Parses response text with optional response code.
    ///
    /// Some servers omit the text entirely (`A1 OK\r\n`), so the leading
    /// space is optional.
    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        if lexer.peek() == Some(b' ') {
            lexer.advance();
        }

        let text = read_text_until_crlf(lexer);

        Ok((code, text))
    }
}

pub(crate) use helpers::parse_flag_list;

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
    use crate::types::{Capability, Flag, ResponseCode};

    use super::*;

    #[test]
    fn test_parse_ok_response() {
        let input = b"* OK IMAP4rev1 server ready\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                assert!(code.is_none());
                assert_eq!(text, "IMAP4rev1 server ready");
            }
            _ => panic!("Expected untagged OK"),
        }
    }

    #[test]
    fn test_parse_tagged_ok() {
        let input = b"A0001 OK LOGIN completed\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => {
                assert_eq!(tag.as_str(), "A0001");
                assert_eq!(status, Status::Ok);
                assert!(code.is_none());
                assert_eq!(text, "LOGIN completed");
            }
            _ => panic!("Expected tagged response"),
        }
    }

    #[test]
    fn test_parse_tagged_without_text() {
        let response = ResponseParser::parse(b"A0002 OK\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Tagged { status: Status::Ok, ref text, .. } if text.is_empty()
        ));
    }

    #[test]
    fn test_parse_tagged_no_with_code() {
        let input = b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n";
        match ResponseParser::parse(input).unwrap() {
            Response::Tagged {
                status, code, text, ..
            } => {
                assert_eq!(status, Status::No);
                assert_eq!(code, Some(ResponseCode::AuthenticationFailed));
                assert_eq!(text, "Invalid credentials");
            }
            _ => panic!("Expected tagged response"),
        }
    }

    #[test]
    fn test_parse_capability() {
        let input = b"* CAPABILITY IMAP4rev1 LITERAL+ AUTH=PLAIN\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Capability(caps)) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::LiteralPlus));
                assert!(caps.contains(&Capability::Auth("PLAIN".to_string())));
            }
            _ => panic!("Expected capability response"),
        }
    }

    #[test]
    fn test_parse_exists() {
        let input = b"* 23 EXISTS\r\n";
        let response = ResponseParser::parse(input).unwrap();

        assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(23)));
    }

    #[test]
    fn test_parse_flags() {
        let input = b"* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Flags(flags)) => {
                assert!(flags.contains(&Flag::Seen));
                assert!(flags.contains(&Flag::Answered));
                assert!(flags.contains(&Flag::Flagged));
            }
            _ => panic!("Expected FLAGS"),
        }
    }

    #[test]
    fn test_parse_unhandled_untagged() {
        let input = b"* LIST (\\HasChildren) \"/\" \"INBOX\"\r\n";
        let response = ResponseParser::parse(input).unwrap();

        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Other(ref s)) if s.starts_with("LIST")
        ));
    }

    #[test]
    fn test_parse_continuation() {
        let input = b"+ Ready for literal\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Continuation { text } => {
                assert_eq!(text, Some("Ready for literal".to_string()));
            }
            _ => panic!("Expected continuation"),
        }
    }

    #[test]
    fn test_parse_bare_continuation() {
        let response = ResponseParser::parse(b"+\r\n").unwrap();
        assert_eq!(response, Response::Continuation { text: None });
    }

    #[test]
    fn test_parse_response_code() {
        let input = b"* OK [UIDVALIDITY 1234567890] UIDs valid\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                match code {
                    Some(ResponseCode::UidValidity(v)) => {
                        assert_eq!(v.get(), 1_234_567_890);
                    }
                    _ => panic!("Expected UIDVALIDITY code"),
                }
                assert_eq!(text, "UIDs valid");
            }
            _ => panic!("Expected untagged OK"),
        }
    }

    #[test]
    fn test_parse_fetch() {
        let input = b"* 1 FETCH (FLAGS (\\Seen) UID 12345)\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 1);
                assert!(
                    items
                        .iter()
                        .any(|i| matches!(i, FetchItem::Uid(uid) if uid.get() == 12345))
                );
                assert!(
                    items
                        .iter()
                        .any(|i| matches!(i, FetchItem::Flags(f) if f.is_seen()))
                );
            }
            _ => panic!("Expected FETCH"),
        }
    }

    #[test]
    fn test_parse_search() {
        let input = b"* SEARCH 1 2 3 5 8 13\r\n";
        let response = ResponseParser::parse(input).unwrap();

        match response {
            Response::Untagged(UntaggedResponse::Search(nums)) => {
                let values: Vec<u32> = nums.iter().map(|s| s.get()).collect();
                assert_eq!(values, vec![1, 2, 3, 5, 8, 13]);
            }
            _ => panic!("Expected SEARCH"),
        }
    }

    #[test]
    fn test_parse_fetch_seq_zero_rejected() {
        assert!(ResponseParser::parse(b"* 0 FETCH (UID 1)\r\n").is_err());
    }
}

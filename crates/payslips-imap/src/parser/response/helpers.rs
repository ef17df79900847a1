//! Parser helper functions.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{Capability, Flag, Flags, ResponseCode, SeqNum, Uid, UidValidity};
use crate::{Error, Result};

/// Parses a response code.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "AUTHENTICATIONFAILED" => ResponseCode::AuthenticationFailed,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid UID 0".to_string(),
            })?;
            ResponseCode::UidNext(uid)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let validity = UidValidity::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid UIDVALIDITY 0".to_string(),
            })?;
            ResponseCode::UidValidity(validity)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "Invalid sequence number 0".to_string(),
            })?;
            ResponseCode::Unseen(seq)
        }
        "CAPABILITY" => {
            let caps = parse_capability_data(lexer)?;
            ResponseCode::Capability(caps)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            let flags = parse_flag_list(lexer)?;
            ResponseCode::PermanentFlags(flags.iter().cloned().collect())
        }
        _ => ResponseCode::Unknown(atom.to_string()),
    };

    // Skip to closing bracket
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        lexer.advance();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Parses capability data.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a flag list.
///
/// `\*` is not an atom (the asterisk is special), so it arrives as a lone
/// backslash followed by an asterisk token.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom("\\") if lexer.peek() == Some(b'*') => {
                lexer.advance();
                flags.insert(Flag::AnyKeyword);
            }
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("Unexpected token in flag list: {token:?}"),
                });
            }
        }
    }

    Ok(flags)
}

/// Parses a SEARCH response.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<SeqNum>> {
    let mut nums = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.advance();
        if let Token::Number(n) = lexer.next_token()?
            && let Some(seq) = SeqNum::new(n)
        {
            nums.push(seq);
        }
    }

    Ok(nums)
}

/// Reads text until CRLF.
pub fn read_text_until_crlf(lexer: &mut Lexer<'_>) -> String {
    let remaining = lexer.remaining();

    let end = remaining
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(remaining.len());

    lexer.skip(end);

    if lexer.peek() == Some(b'\r') {
        lexer.skip(2);
    }

    String::from_utf8_lossy(&remaining[..end]).into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_list_with_any_keyword() {
        let mut lexer = Lexer::new(b"(\\Seen \\Deleted \\*)");
        let flags = parse_flag_list(&mut lexer).unwrap();

        assert_eq!(flags.len(), 3);
        assert!(flags.contains(&Flag::AnyKeyword));
        assert!(flags.contains(&Flag::Deleted));
    }

    #[test]
    fn test_permanent_flags_code() {
        let mut lexer = Lexer::new(b"[PERMANENTFLAGS (\\Seen \\*)]");
        let code = parse_response_code(&mut lexer).unwrap();

        assert_eq!(
            code,
            ResponseCode::PermanentFlags(vec![Flag::Seen, Flag::AnyKeyword])
        );
    }

    #[test]
    fn test_authentication_failed_code() {
        let mut lexer = Lexer::new(b"[AUTHENTICATIONFAILED]");
        assert_eq!(
            parse_response_code(&mut lexer).unwrap(),
            ResponseCode::AuthenticationFailed
        );
    }

    #[test]
    fn test_unknown_code_with_arguments() {
        let mut lexer = Lexer::new(b"[HIGHESTMODSEQ 9001] rest");
        assert_eq!(
            parse_response_code(&mut lexer).unwrap(),
            ResponseCode::Unknown("HIGHESTMODSEQ".to_string())
        );
        assert_eq!(lexer.remaining(), b" rest");
    }

    #[test]
    fn test_empty_search() {
        let mut lexer = Lexer::new(b"\r\n");
        assert!(parse_search_response(&mut lexer).unwrap().is_empty());
    }

    #[test]
    fn test_read_text_lossy() {
        let mut lexer = Lexer::new(b"caf\xe9 ready\r\nnext");
        assert_eq!(read_text_until_crlf(&mut lexer), "caf\u{fffd} ready");
        assert_eq!(lexer.remaining(), b"next");
    }
}

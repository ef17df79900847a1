//! IMAP command builder.
//!
//! This module provides types and serialization for the commands this
//! client issues.

mod serialize;
mod tag_generator;
mod types;

use crate::types::SequenceSet;

pub use serialize::CommandBytes;
pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, LiteralMode, SearchKey};

use serialize::{CommandWriter, write_fetch_attributes, write_search_key};

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // Any State Commands
    /// CAPABILITY command.
    Capability,
    /// LOGOUT command.
    Logout,

    // Not Authenticated State Commands
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },

    // Authenticated State Commands
    /// SELECT command.
    Select {
        /// Mailbox name, sent as an astring.
        mailbox: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Mailbox name, sent as an astring.
        mailbox: String,
    },

    // Selected State Commands
    /// SEARCH command.
    ///
    /// `CHARSET UTF-8` is added when any key carries non-ASCII text.
    Search {
        /// Search key.
        key: SearchKey,
    },
    /// FETCH command.
    Fetch {
        /// Sequence set.
        sequence: SequenceSet,
        /// Items to fetch.
        items: Vec<FetchAttribute>,
    },
}

impl Command {
    /// Serializes the command with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str, mode: LiteralMode) -> CommandBytes {
        let mut w = CommandWriter::new(mode);
        w.raw(tag.as_bytes());
        w.raw(b" ");

        match self {
            Self::Capability => w.raw(b"CAPABILITY"),
            Self::Logout => w.raw(b"LOGOUT"),

            Self::Login { username, password } => {
                w.raw(b"LOGIN ");
                w.astring(username);
                w.raw(b" ");
                w.astring(password);
            }

            Self::Select { mailbox } => {
                w.raw(b"SELECT ");
                w.astring(mailbox);
            }

            Self::Examine { mailbox } => {
                w.raw(b"EXAMINE ");
                w.astring(mailbox);
            }

            Self::Search { key } => {
                w.raw(b"SEARCH ");
                if key.needs_utf8() {
                    w.raw(b"CHARSET UTF-8 ");
                }
                write_search_key(&mut w, key, false);
            }

            Self::Fetch { sequence, items } => {
                w.raw(b"FETCH ");
                w.raw(sequence.to_string().as_bytes());
                w.raw(b" ");
                write_fetch_attributes(&mut w, items);
            }
        }

        w.finish()
    }

    /// Returns the command keyword, safe to log.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Logout => "LOGOUT",
            Self::Login { .. } => "LOGIN",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
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

    fn wire(cmd: &Command) -> Vec<u8> {
        cmd.serialize("A001", LiteralMode::Synchronizing).to_vec()
    }

    #[test]
    fn test_capability_command() {
        assert_eq!(wire(&Command::Capability), b"A001 CAPABILITY\r\n");
    }

    #[test]
    fn test_login_command() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(wire(&cmd), b"A001 LOGIN user pass\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(wire(&cmd), b"A001 LOGIN user@example.com \"pass word\"\r\n");
    }

    #[test]
    fn test_examine_command() {
        let cmd = Command::Examine {
            mailbox: "Inbox".to_string(),
        };
        assert_eq!(wire(&cmd), b"A001 EXAMINE Inbox\r\n");
    }

    #[test]
    fn test_select_quoted_mailbox() {
        let cmd = Command::Select {
            mailbox: "[Gmail]/All Mail".to_string(),
        };
        assert_eq!(wire(&cmd), b"A001 SELECT \"[Gmail]/All Mail\"\r\n");
    }

    #[test]
    fn test_fetch_command() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::range(1, 10).unwrap(),
            items: vec![FetchAttribute::Envelope, FetchAttribute::body_peek()],
        };
        assert_eq!(wire(&cmd), b"A001 FETCH 1:10 (ENVELOPE BODY.PEEK[])\r\n");
    }

    #[test]
    fn test_search_ascii() {
        let cmd = Command::Search {
            key: SearchKey::Body("payslip".into()),
        };
        assert_eq!(wire(&cmd), b"A001 SEARCH BODY \"payslip\"\r\n");
    }

    #[test]
    fn test_search_utf8_uses_charset_and_literal() {
        let cmd = Command::Search {
            key: SearchKey::Body("תלוש".into()),
        };
        let bytes = cmd.serialize("A001", LiteralMode::Synchronizing);
        assert_eq!(bytes.parts().len(), 2);
        assert_eq!(bytes.parts()[0], b"A001 SEARCH CHARSET UTF-8 BODY {8}\r\n");
        assert_eq!(bytes.parts()[1], "תלוש\r\n".as_bytes());
    }

    #[test]
    fn test_search_utf8_literal_plus() {
        let cmd = Command::Search {
            key: SearchKey::Body("תלוש".into()),
        };
        let bytes = cmd.serialize("A001", LiteralMode::NonSynchronizing);
        assert_eq!(bytes.parts().len(), 1);
        assert_eq!(
            bytes.to_vec(),
            "A001 SEARCH CHARSET UTF-8 BODY {8+}\r\nתלוש\r\n".as_bytes()
        );
    }
}

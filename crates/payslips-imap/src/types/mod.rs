//! Core IMAP types.
//!
//! This module defines the fundamental types used throughout the IMAP library,
//! following RFC 9051 (`IMAP4rev2`) and RFC 3501 (`IMAP4rev1`).

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod flags;
mod identifiers;
mod response_code;
mod sequence;

pub use capability::{Capability, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;

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
    fn test_seq_num_new() {
        assert!(SeqNum::new(0).is_none());
        assert!(SeqNum::new(1).is_some());
        assert_eq!(SeqNum::new(42).unwrap().get(), 42);
    }

    #[test]
    fn test_capability_parse() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("IMAP4REV2"), Capability::Imap4Rev2);
        assert_eq!(Capability::parse("literal+"), Capability::LiteralPlus);
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
        assert_eq!(
            Capability::parse("X-GM-EXT-1"),
            Capability::Unknown("X-GM-EXT-1".to_string())
        );
    }

    #[test]
    fn test_flag_parse() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\DELETED"), Flag::Deleted);
        assert_eq!(Flag::parse("$Junk"), Flag::Keyword("$Junk".to_string()));
    }

    #[test]
    fn test_sequence_set_display() {
        assert_eq!(SequenceSet::single(1).unwrap().to_string(), "1");
        assert_eq!(SequenceSet::range(1, 10).unwrap().to_string(), "1:10");
    }
}

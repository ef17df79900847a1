//! Command serialization helpers.

use super::types::{FetchAttribute, LiteralMode, SearchKey};

/// A serialized command, split at every synchronizing literal.
///
/// Every part except the last ends with a `{n}\r\n` literal header; the
/// client must wait for a `+` continuation before sending the next part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBytes {
    parts: Vec<Vec<u8>>,
}

impl CommandBytes {
    /// Returns the parts in transmission order.
    #[must_use]
    pub fn parts(&self) -> &[Vec<u8>] {
        &self.parts
    }

    /// Returns true if the command contains a synchronizing literal.
    #[must_use]
    pub fn needs_continuation(&self) -> bool {
        self.parts.len() > 1
    }

    /// Concatenates all parts, as they appear on the wire.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.parts.concat()
    }
}

/// Incremental writer for one command line.
#[derive(Debug)]
pub struct CommandWriter {
    mode: LiteralMode,
    parts: Vec<Vec<u8>>,
    current: Vec<u8>,
}

impl CommandWriter {
    /// Creates a writer that sends literals using `mode`.
    #[must_use]
    pub const fn new(mode: LiteralMode) -> Self {
        Self {
            mode,
            parts: Vec::new(),
            current: Vec::new(),
        }
    }

    /// Appends raw protocol bytes.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.current.extend_from_slice(bytes);
    }

    /// Writes an astring (atom, quoted string or literal).
    pub fn astring(&mut self, s: &str) {
        if !s.is_empty() && !s.bytes().any(needs_quoting) {
            self.raw(s.as_bytes());
        } else {
            self.string(s);
        }
    }

    /// Writes a string (quoted string or literal).
    pub fn string(&mut self, s: &str) {
        if s.bytes().all(is_quotable) {
            self.current.push(b'"');
            for b in s.bytes() {
                if b == b'"' || b == b'\\' {
                    self.current.push(b'\\');
                }
                self.current.push(b);
            }
            self.current.push(b'"');
        } else {
            self.literal(s.as_bytes());
        }
    }

    fn literal(&mut self, data: &[u8]) {
        if self.mode.is_non_synchronizing(data.len()) {
            self.raw(format!("{{{}+}}\r\n", data.len()).as_bytes());
        } else {
            self.raw(format!("{{{}}}\r\n", data.len()).as_bytes());
            self.parts.push(std::mem::take(&mut self.current));
        }
        self.raw(data);
    }

    /// Terminates the command line.
    #[must_use]
    pub fn finish(mut self) -> CommandBytes {
        self.current.extend_from_slice(b"\r\n");
        self.parts.push(self.current);
        CommandBytes { parts: self.parts }
    }
}

/// Returns true if the byte cannot appear in an atom.
const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b >= 0x7F
}

/// Returns true if the byte can appear inside a quoted string.
const fn is_quotable(b: u8) -> bool {
    b != 0 && b != b'\r' && b != b'\n' && b < 0x80
}

/// Writes FETCH attributes as a parenthesized list.
pub fn write_fetch_attributes(w: &mut CommandWriter, attrs: &[FetchAttribute]) {
    if let [single] = attrs {
        write_fetch_attribute(w, single);
        return;
    }
    w.raw(b"(");
    for (i, attr) in attrs.iter().enumerate() {
        if i > 0 {
            w.raw(b" ");
        }
        write_fetch_attribute(w, attr);
    }
    w.raw(b")");
}

fn write_fetch_attribute(w: &mut CommandWriter, attr: &FetchAttribute) {
    match attr {
        FetchAttribute::Flags => w.raw(b"FLAGS"),
        FetchAttribute::Rfc822Size => w.raw(b"RFC822.SIZE"),
        FetchAttribute::Envelope => w.raw(b"ENVELOPE"),
        FetchAttribute::Uid => w.raw(b"UID"),
        FetchAttribute::Body { section, peek } => {
            w.raw(if *peek { b"BODY.PEEK[" } else { b"BODY[" });
            if let Some(s) = section {
                w.raw(s.as_bytes());
            }
            w.raw(b"]");
        }
    }
}

/// Writes a SEARCH key.
///
/// `nested` is true inside `OR`/`NOT`, where a multi-key `AND` has to be
/// parenthesized to stay a single key.
pub fn write_search_key(w: &mut CommandWriter, key: &SearchKey, nested: bool) {
    match key {
        SearchKey::All => w.raw(b"ALL"),
        SearchKey::Seen => w.raw(b"SEEN"),
        SearchKey::Unseen => w.raw(b"UNSEEN"),
        SearchKey::Body(s) => {
            w.raw(b"BODY ");
            w.string(s);
        }
        SearchKey::Text(s) => {
            w.raw(b"TEXT ");
            w.string(s);
        }
        SearchKey::Subject(s) => {
            w.raw(b"SUBJECT ");
            w.string(s);
        }
        SearchKey::From(s) => {
            w.raw(b"FROM ");
            w.string(s);
        }
        SearchKey::Header(name, value) => {
            w.raw(b"HEADER ");
            w.astring(name);
            w.raw(b" ");
            w.string(value);
        }
        SearchKey::And(keys) => {
            let wrap = nested && keys.len() > 1;
            if wrap {
                w.raw(b"(");
            }
            for (i, k) in keys.iter().enumerate() {
                if i > 0 {
                    w.raw(b" ");
                }
                write_search_key(w, k, false);
            }
            if wrap {
                w.raw(b")");
            }
        }
        SearchKey::Or(a, b) => {
            w.raw(b"OR ");
            write_search_key(w, a, true);
            w.raw(b" ");
            write_search_key(w, b, true);
        }
        SearchKey::Not(k) => {
            w.raw(b"NOT ");
            write_search_key(w, k, true);
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

    fn astring(s: &str, mode: LiteralMode) -> CommandBytes {
        let mut w = CommandWriter::new(mode);
        w.astring(s);
        w.finish()
    }

    #[test]
    fn test_astring_atom() {
        assert_eq!(astring("INBOX", LiteralMode::Synchronizing).to_vec(), b"INBOX\r\n");
    }

    #[test]
    fn test_astring_quoted() {
        assert_eq!(
            astring("pass \"word\"", LiteralMode::Synchronizing).to_vec(),
            b"\"pass \\\"word\\\"\"\r\n"
        );
        assert_eq!(astring("", LiteralMode::Synchronizing).to_vec(), b"\"\"\r\n");
    }

    #[test]
    fn test_non_ascii_becomes_synchronizing_literal() {
        let bytes = astring("סיסמה", LiteralMode::Synchronizing);
        assert!(bytes.needs_continuation());
        assert_eq!(bytes.parts()[0], b"{10}\r\n");
        assert_eq!(bytes.parts()[1], "סיסמה\r\n".as_bytes());
    }

    #[test]
    fn test_non_ascii_literal_plus() {
        let bytes = astring("סיסמה", LiteralMode::NonSynchronizing);
        assert!(!bytes.needs_continuation());
        assert_eq!(bytes.to_vec(), "{10+}\r\nסיסמה\r\n".as_bytes());
    }

    #[test]
    fn test_crlf_forces_literal() {
        let bytes = astring("a\r\nb", LiteralMode::Synchronizing);
        assert_eq!(bytes.to_vec(), b"{4}\r\na\r\nb\r\n");
    }

    #[test]
    fn test_or_parenthesizes_nested_and() {
        let key = SearchKey::Or(
            Box::new(SearchKey::And(vec![SearchKey::Seen, SearchKey::Body("x".into())])),
            Box::new(SearchKey::Unseen),
        );
        let mut w = CommandWriter::new(LiteralMode::Synchronizing);
        write_search_key(&mut w, &key, false);
        assert_eq!(w.finish().to_vec(), b"OR (SEEN BODY \"x\") UNSEEN\r\n");
    }

    #[test]
    fn test_top_level_and_is_flat() {
        let key = SearchKey::And(vec![
            SearchKey::Body("a".into()),
            SearchKey::Header("FROM".into(), "hr@example.com".into()),
        ]);
        let mut w = CommandWriter::new(LiteralMode::Synchronizing);
        write_search_key(&mut w, &key, false);
        assert_eq!(
            w.finish().to_vec(),
            b"BODY \"a\" HEADER FROM \"hr@example.com\"\r\n"
        );
    }

    #[test]
    fn test_fetch_attributes() {
        let mut w = CommandWriter::new(LiteralMode::Synchronizing);
        write_fetch_attributes(&mut w, &[FetchAttribute::Envelope, FetchAttribute::body_peek()]);
        assert_eq!(w.finish().to_vec(), b"(ENVELOPE BODY.PEEK[])\r\n");
    }
}

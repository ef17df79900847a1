//! Command-related type definitions.

/// FETCH attribute to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// RFC822 size.
    Rfc822Size,
    /// Envelope structure.
    Envelope,
    /// UID.
    Uid,
    /// Body section.
    Body {
        /// Section specifier; `None` is the whole message.
        section: Option<String>,
        /// Peek (don't set \Seen).
        peek: bool,
    },
}

impl FetchAttribute {
    /// The complete raw message, fetched without setting `\Seen`.
    #[must_use]
    pub const fn body_peek() -> Self {
        Self::Body {
            section: None,
            peek: true,
        }
    }
}

/// SEARCH key (RFC 9051 §6.4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchKey {
    /// All messages.
    All,
    /// Messages with \Seen flag.
    Seen,
    /// Messages without \Seen flag.
    Unseen,
    /// Body contains text.
    Body(String),
    /// Text in header or body.
    Text(String),
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// Header field contains value.
    Header(String, String),
    /// AND of keys.
    And(Vec<Self>),
    /// OR of two keys.
    Or(Box<Self>, Box<Self>),
    /// NOT of a key.
    Not(Box<Self>),
}

impl SearchKey {
    /// Combines keys so that a message matching any of them matches.
    ///
    /// Builds a right-nested `OR` chain. Returns `None` for no keys.
    #[must_use]
    pub fn any_of(keys: impl IntoIterator<Item = Self>) -> Option<Self> {
        let mut keys: Vec<Self> = keys.into_iter().collect();
        let mut acc = keys.pop()?;
        while let Some(key) = keys.pop() {
            acc = Self::Or(Box::new(key), Box::new(acc));
        }
        Some(acc)
    }

    /// Combines keys so that a message must match all of them.
    ///
    /// No keys means every message; a single key is returned unchanged.
    #[must_use]
    pub fn all_of(keys: impl IntoIterator<Item = Self>) -> Self {
        let mut keys: Vec<Self> = keys.into_iter().collect();
        match keys.len() {
            0 => Self::All,
            1 => keys.remove(0),
            _ => Self::And(keys),
        }
    }

    /// Returns true if any string argument contains non-ASCII text.
    #[must_use]
    pub fn needs_utf8(&self) -> bool {
        match self {
            Self::All | Self::Seen | Self::Unseen => false,
            Self::Body(s) | Self::Text(s) | Self::Subject(s) | Self::From(s) => !s.is_ascii(),
            Self::Header(name, value) => !name.is_ascii() || !value.is_ascii(),
            Self::And(keys) => keys.iter().any(Self::needs_utf8),
            Self::Or(a, b) => a.needs_utf8() || b.needs_utf8(),
            Self::Not(key) => key.needs_utf8(),
        }
    }
}

/// How string literals are transmitted (RFC 7888).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LiteralMode {
    /// `{n}`: wait for a `+` continuation before sending the data.
    #[default]
    Synchronizing,
    /// `{n+}` for any size (LITERAL+).
    NonSynchronizing,
    /// `{n+}` up to 4096 bytes, synchronizing above (LITERAL-).
    NonSynchronizingSmall,
}

impl LiteralMode {
    /// Largest literal LITERAL- allows without synchronization.
    pub const LITERAL_MINUS_LIMIT: usize = 4096;

    /// Returns true if a literal of `len` bytes can be sent without waiting.
    #[must_use]
    pub const fn is_non_synchronizing(self, len: usize) -> bool {
        match self {
            Self::Synchronizing => false,
            Self::NonSynchronizing => true,
            Self::NonSynchronizingSmall => len <= Self::LITERAL_MINUS_LIMIT,
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
    fn test_any_of_empty() {
        assert_eq!(SearchKey::any_of(Vec::new()), None);
    }

    #[test]
    fn test_any_of_single() {
        let key = SearchKey::any_of([SearchKey::Body("a".into())]).unwrap();
        assert_eq!(key, SearchKey::Body("a".into()));
    }

    #[test]
    fn test_any_of_nests_to_the_right() {
        let key = SearchKey::any_of([
            SearchKey::Body("a".into()),
            SearchKey::Body("b".into()),
            SearchKey::Body("c".into()),
        ])
        .unwrap();
        assert_eq!(
            key,
            SearchKey::Or(
                Box::new(SearchKey::Body("a".into())),
                Box::new(SearchKey::Or(
                    Box::new(SearchKey::Body("b".into())),
                    Box::new(SearchKey::Body("c".into())),
                )),
            )
        );
    }

    #[test]
    fn test_all_of() {
        assert_eq!(SearchKey::all_of(Vec::new()), SearchKey::All);
        assert_eq!(SearchKey::all_of([SearchKey::Seen]), SearchKey::Seen);
        assert!(matches!(
            SearchKey::all_of([SearchKey::Seen, SearchKey::Unseen]),
            SearchKey::And(keys) if keys.len() == 2
        ));
    }

    #[test]
    fn test_needs_utf8() {
        assert!(!SearchKey::Body("payslip".into()).needs_utf8());
        assert!(SearchKey::Body("תלוש".into()).needs_utf8());
        assert!(
            SearchKey::Not(Box::new(SearchKey::Header("From".into(), "Zoë".into()))).needs_utf8()
        );
    }

    #[test]
    fn test_literal_mode() {
        assert!(!LiteralMode::Synchronizing.is_non_synchronizing(1));
        assert!(LiteralMode::NonSynchronizing.is_non_synchronizing(1 << 20));
        assert!(LiteralMode::NonSynchronizingSmall.is_non_synchronizing(4096));
        assert!(!LiteralMode::NonSynchronizingSmall.is_non_synchronizing(4097));
    }
}

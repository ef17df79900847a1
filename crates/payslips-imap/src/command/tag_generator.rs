//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses.

/// Tag generator for IMAP commands.
///
/// Generates sequential tags in the format "A0000", "A0001", etc.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self { counter: 0, prefix }
    }

    /// Generates the next tag.
    ///
    /// The counter wraps after `u32::MAX` tags; only the tags of commands
    /// still in flight have to be distinct.
    pub fn next(&mut self) -> String {
        let n = self.counter;
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:04}", self.prefix, n)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
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
    fn test_tag_generation() {
        let mut generator = TagGenerator::default();
        assert_eq!(generator.next(), "A0000");
        assert_eq!(generator.next(), "A0001");
        assert_eq!(generator.next(), "A0002");
    }

    #[test]
    fn test_custom_prefix_and_padding() {
        let mut generator = TagGenerator::new('T');
        for _ in 0..100 {
            let _ = generator.next();
        }
        assert_eq!(generator.next(), "T0100");
    }

    #[test]
    fn test_wraps_instead_of_panicking() {
        let mut generator = TagGenerator {
            counter: u32::MAX,
            prefix: 'A',
        };
        assert_eq!(generator.next(), format!("A{}", u32::MAX));
        assert_eq!(generator.next(), "A0000");
    }
}

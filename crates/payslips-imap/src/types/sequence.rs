//! Sequence sets for message ranges.

use super::SeqNum;

/// Sequence set for specifying message ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceSet {
    /// Single sequence number.
    Single(SeqNum),
    /// Range of sequence numbers (inclusive).
    Range(SeqNum, SeqNum),
    /// Multiple sequence specifications.
    Set(Vec<Self>),
}

impl SequenceSet {
    /// Creates a sequence set from a single number.
    #[must_use]
    pub fn single(n: u32) -> Option<Self> {
        SeqNum::new(n).map(Self::Single)
    }

    /// Creates a range sequence set.
    #[must_use]
    pub fn range(start: u32, end: u32) -> Option<Self> {
        Some(Self::Range(SeqNum::new(start)?, SeqNum::new(end)?))
    }

    /// Builds the most compact set covering the given sequence numbers.
    ///
    /// Input order and duplicates do not matter. Returns `None` for an empty
    /// slice, which has no valid IMAP representation.
    #[must_use]
    pub fn from_seq_nums(nums: &[SeqNum]) -> Option<Self> {
        let mut sorted = nums.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut runs: Vec<Self> = Vec::new();
        let mut iter = sorted.into_iter();
        let first = iter.next()?;
        let (mut start, mut end) = (first, first);

        for n in iter {
            if end.get().checked_add(1) == Some(n.get()) {
                end = n;
            } else {
                runs.push(Self::run(start, end));
                start = n;
                end = n;
            }
        }
        runs.push(Self::run(start, end));

        if runs.len() == 1 {
            runs.pop()
        } else {
            Some(Self::Set(runs))
        }
    }

    fn run(start: SeqNum, end: SeqNum) -> Self {
        if start == end {
            Self::Single(start)
        } else {
            Self::Range(start, end)
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{n}"),
            Self::Range(start, end) => write!(f, "{start}:{end}"),
            Self::Set(items) => {
                let s: Vec<_> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", s.join(","))
            }
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
    use proptest::prelude::*;

    use super::*;

    fn seqs(values: &[u32]) -> Vec<SeqNum> {
        values.iter().map(|&n| SeqNum::new(n).unwrap()).collect()
    }

    #[test]
    fn test_single_zero_returns_none() {
        assert!(SequenceSet::single(0).is_none());
        assert!(SequenceSet::range(0, 3).is_none());
    }

    #[test]
    fn test_from_seq_nums_empty() {
        assert!(SequenceSet::from_seq_nums(&[]).is_none());
    }

    #[test]
    fn test_from_seq_nums_single() {
        let set = SequenceSet::from_seq_nums(&seqs(&[9])).unwrap();
        assert_eq!(set, SequenceSet::single(9).unwrap());
    }

    #[test]
    fn test_from_seq_nums_compresses_runs() {
        let set = SequenceSet::from_seq_nums(&seqs(&[8, 1, 2, 3, 5, 9, 2])).unwrap();
        assert_eq!(set.to_string(), "1:3,5,8:9");
    }

    #[test]
    fn test_from_seq_nums_contiguous() {
        let set = SequenceSet::from_seq_nums(&seqs(&[4, 3, 2])).unwrap();
        assert_eq!(set, SequenceSet::range(2, 4).unwrap());
    }

    proptest! {
        #[test]
        fn from_seq_nums_covers_exactly_the_input(
            values in prop::collection::vec(1u32..200, 1..40),
        ) {
            let set = SequenceSet::from_seq_nums(&seqs(&values)).unwrap();
            let mut expected: Vec<u32> = values.clone();
            expected.sort_unstable();
            expected.dedup();

            let mut covered = Vec::new();
            for part in set.to_string().split(',') {
                match part.split_once(':') {
                    Some((a, b)) => {
                        covered.extend(a.parse::<u32>().unwrap()..=b.parse::<u32>().unwrap());
                    }
                    None => covered.push(part.parse::<u32>().unwrap()),
                }
            }
            prop_assert_eq!(covered, expected);
        }
    }
}

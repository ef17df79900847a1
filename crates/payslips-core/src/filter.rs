//! Attachment selection by content type and filename.

use std::sync::LazyLock;

use regex::Regex;

/// Media types a payslip may arrive as.
pub const ALLOWED_CONTENT_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

/// `{9-digit id}_{year 2010-2029}_{month}.pdf`. The month check is loose
/// (`00` and `13`-`19` pass).
#[allow(clippy::expect_used)]
static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{9}_20[1-2][0-9]_[0-1][0-9]\.pdf$").expect("filename pattern is valid")
});

/// Returns true if `content_type` (lower-case `type/subtype`, no parameters)
/// may carry a payslip.
#[must_use]
pub fn is_allowed_content_type(content_type: &str) -> bool {
    ALLOWED_CONTENT_TYPES.contains(&content_type)
}

/// Returns true if `filename` has the payslip shape `123456789_2024_01.pdf`.
#[must_use]
pub fn matches_filename_pattern(filename: &str) -> bool {
    FILENAME_PATTERN.is_match(filename)
}

/// Outcome of [`AttachmentFilter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'a> {
    /// Handle the attachment; carries its filename.
    Accept(&'a str),
    /// Media type is not one of [`ALLOWED_CONTENT_TYPES`].
    WrongContentType,
    /// Missing filename or one that does not match the pattern.
    WrongFilename,
    /// Filename belongs to a different id.
    OtherId,
}

/// Decides which attachments are payslips.
#[derive(Debug, Clone, Default)]
pub struct AttachmentFilter {
    expected_id: Option<String>,
}

impl AttachmentFilter {
    /// Creates a filter. With `expected_id` set, only that id's files pass.
    #[must_use]
    pub const fn new(expected_id: Option<String>) -> Self {
        Self { expected_id }
    }

    /// Checks content type first, then filename, then id.
    ///
    /// Rejections are logged; they are not errors.
    #[must_use]
    pub fn check<'a>(&self, content_type: &str, filename: Option<&'a str>) -> Verdict<'a> {
        if !is_allowed_content_type(content_type) {
            tracing::debug!("skipping {content_type} attachment {filename:?}");
            return Verdict::WrongContentType;
        }

        let Some(filename) = filename else {
            tracing::debug!("skipping {content_type} attachment without a filename");
            return Verdict::WrongFilename;
        };
        if !matches_filename_pattern(filename) {
            tracing::info!("file {filename:?} does not match the filename pattern");
            return Verdict::WrongFilename;
        }

        if let Some(expected) = &self.expected_id
            && filename.split('_').next() != Some(expected.as_str())
        {
            tracing::info!("file {filename:?} does not belong to id {expected}");
            return Verdict::OtherId;
        }

        Verdict::Accept(filename)
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
    use proptest::prelude::*;

    #[test]
    fn test_content_types() {
        assert!(is_allowed_content_type("application/pdf"));
        assert!(is_allowed_content_type("application/octet-stream"));
        assert!(!is_allowed_content_type("image/png"));
        assert!(!is_allowed_content_type("text/plain"));
        assert!(!is_allowed_content_type("application/pdf; name=a.pdf"));
    }

    #[test]
    fn test_filename_pattern_examples() {
        assert!(matches_filename_pattern("123456789_2024_01.pdf"));
        assert!(matches_filename_pattern("000000000_2010_12.pdf"));
        assert!(!matches_filename_pattern("12345678_2024_01.pdf"));
        assert!(!matches_filename_pattern("123456789_2030_01.pdf"));
        assert!(!matches_filename_pattern("123456789_2024_1.pdf"));
        assert!(!matches_filename_pattern("123456789_2024_01.PDF"));
        assert!(!matches_filename_pattern("123456789_2024_01xpdf"));
        assert!(!matches_filename_pattern("x123456789_2024_01.pdf"));
        assert!(!matches_filename_pattern("123456789_2024_01.pdf.exe"));
    }

    #[test]
    fn test_filename_pattern_month_leniency() {
        assert!(matches_filename_pattern("123456789_2024_15.pdf"));
        assert!(matches_filename_pattern("123456789_2024_00.pdf"));
        assert!(!matches_filename_pattern("123456789_2024_20.pdf"));
    }

    #[test]
    fn test_filename_pattern_ascii_digits_only() {
        // Arabic-Indic digits are not accepted
        assert!(!matches_filename_pattern("١٢٣٤٥٦٧٨٩_2024_01.pdf"));
    }

    #[test]
    fn test_check_order() {
        let filter = AttachmentFilter::default();
        assert_eq!(
            filter.check("image/png", Some("123456789_2024_01.pdf")),
            Verdict::WrongContentType
        );
        assert_eq!(
            filter.check("application/pdf", Some("report.pdf")),
            Verdict::WrongFilename
        );
        assert_eq!(filter.check("application/pdf", None), Verdict::WrongFilename);
        assert_eq!(
            filter.check("application/octet-stream", Some("123456789_2024_01.pdf")),
            Verdict::Accept("123456789_2024_01.pdf")
        );
    }

    #[test]
    fn test_check_expected_id() {
        let filter = AttachmentFilter::new(Some("123456789".to_string()));
        assert_eq!(
            filter.check("application/pdf", Some("123456789_2024_01.pdf")),
            Verdict::Accept("123456789_2024_01.pdf")
        );
        assert_eq!(
            filter.check("application/pdf", Some("987654321_2024_01.pdf")),
            Verdict::OtherId
        );
    }

    proptest! {
        #[test]
        fn pattern_accepts_every_well_formed_name(
            id in "[0-9]{9}",
            year in 2010u32..=2029,
            month in 0u32..=19,
        ) {
            let name = format!("{id}_{year}_{month:02}.pdf");
            prop_assert!(matches_filename_pattern(&name));
        }

        #[test]
        fn pattern_rejects_other_years(
            id in "[0-9]{9}",
            year in prop_oneof![1000u32..2010, 2030u32..10000],
            month in 1u32..=12,
        ) {
            let name = format!("{id}_{year}_{month:02}.pdf");
            prop_assert!(!matches_filename_pattern(&name));
        }

        #[test]
        fn accepted_names_split_into_three_segments(
            id in "[0-9]{9}",
            year in 2010u32..=2029,
            month in 1u32..=12,
        ) {
            let name = format!("{id}_{year}_{month:02}.pdf");
            let segments: Vec<&str> = name.split('_').collect();
            prop_assert_eq!(segments.len(), 3);
            prop_assert_eq!(segments[0], id.as_str());
        }
    }
}
